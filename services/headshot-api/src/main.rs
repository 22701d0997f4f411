//! Headshot API server binary

use std::net::SocketAddr;
use std::sync::Arc;

use headshot_api::{build_router, AppState, Config};
use headshot_billing_core::StripeProvider;
use headshot_db::{create_pool, run_migrations, Repositories};
use headshot_imaging::GeminiGenerator;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("headshot_api=debug".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Headshot API");

    let config = Config::from_env()?;
    tracing::info!(
        http_port = config.http_port,
        model = %config.gemini.model,
        priced_tiers = config.billing.price_ids.len(),
        "Configuration loaded"
    );

    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };

    let pool = create_pool(&config.database_url).await?;
    if config.run_migrations {
        run_migrations(&pool).await?;
        tracing::info!("Database migrations applied");
    }
    tracing::info!("Database pool created");

    let repos = Repositories::postgres(pool.clone());
    let provider = Arc::new(StripeProvider::new(config.billing.clone())?);
    let generator = Arc::new(GeminiGenerator::new(config.gemini.clone())?);

    let http_port = config.http_port;
    let state = AppState::new(repos, Some(pool), provider, generator, config);
    let app = build_router(state, metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    let api_latency_buckets = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
    // Generations routinely take tens of seconds
    let generation_buckets = &[1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 90.0];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            api_latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full("billing_operation_duration_seconds".to_string()),
            api_latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full("headshot_generation_duration_seconds".to_string()),
            generation_buckets,
        )?
        .install_recorder()?;

    metrics::describe_counter!("headshot_accounts_created_total", "Accounts created on first sign-in");
    metrics::describe_counter!("headshot_credits_consumed_total", "Credits spent");
    metrics::describe_counter!(
        "headshot_credit_replays_total",
        "Consume calls answered from a stored decision"
    );
    metrics::describe_counter!(
        "headshot_credits_denied_total",
        "Consume calls denied for lack of credits"
    );
    metrics::describe_counter!(
        "headshot_generations_total",
        "Generation attempts by result"
    );
    metrics::describe_counter!(
        "headshot_upload_sessions_purged_total",
        "Expired mobile upload sessions deleted"
    );
    metrics::describe_counter!(
        "billing_webhooks_processed_total",
        "Total webhooks processed by outcome"
    );
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request latency in seconds by operation"
    );
    metrics::describe_histogram!(
        "billing_operation_duration_seconds",
        "Billing operation latency in seconds by operation type"
    );
    metrics::describe_histogram!(
        "headshot_generation_duration_seconds",
        "Image generation latency in seconds"
    );

    Ok(handle)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
