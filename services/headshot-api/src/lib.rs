//! Headshot API
//!
//! ## REST Endpoints
//!
//! - `POST /api/v1/account/ensure` - Create or refresh the caller's account
//! - `GET /api/v1/account` - Account profile and credit balance
//! - `POST /api/v1/headshots` - Generate a headshot (one credit, `Idempotency-Key`)
//! - `POST /api/v1/billing/checkout` - Create checkout session
//! - `POST /api/v1/billing/portal` - Create customer portal session
//! - `POST /api/v1/mobile-uploads/sessions` - Start a phone hand-off
//! - `GET /api/v1/mobile-uploads/sessions/{id}` - Take uploads received so far
//! - `POST /api/v1/mobile-uploads/sessions/{id}/uploads` - Upload from the phone
//! - `POST /internal/mobile-uploads/purge` - Delete expired hand-offs (operator)
//! - `POST /webhooks/stripe` - Stripe webhook handler
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use crate::config::{Config, ConfigError};
pub use crate::state::AppState;

use crate::handlers::{health, ready};

/// Assemble the HTTP router with its middleware stack
pub fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.request_timeout();

    let api_v1 = Router::new()
        // Account routes
        .route("/account", get(handlers::get_account))
        .route("/account/ensure", post(handlers::ensure_account))
        // Generation
        .route(
            "/headshots",
            post(handlers::generate_headshot)
                .layer(DefaultBodyLimit::max(handlers::HEADSHOT_BODY_LIMIT)),
        )
        // Billing routes
        .route("/billing/checkout", post(handlers::create_checkout))
        .route("/billing/portal", post(handlers::create_portal))
        // Mobile hand-off
        .route(
            "/mobile-uploads/sessions",
            post(handlers::create_upload_session),
        )
        .route("/mobile-uploads/sessions/{id}", get(handlers::take_uploads))
        .route(
            "/mobile-uploads/sessions/{id}/uploads",
            post(handlers::register_upload),
        );

    // Webhook route (raw body, signature checked before parsing)
    let webhook_routes = Router::new().route("/webhooks/stripe", post(handlers::stripe_webhook));

    let internal_routes = Router::new().route(
        "/internal/mobile-uploads/purge",
        post(handlers::purge_upload_sessions),
    );

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Outermost first
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(webhook_routes)
        .merge(internal_routes)
        .layer(middleware)
        .merge(health_routes)
        .merge(metrics_route)
        .with_state(state)
}
