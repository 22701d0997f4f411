//! Shared fixtures for router tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use headshot_api::{build_router, AppState, Config};
use headshot_billing_core::{BillingError, PaymentProvider};
use headshot_db::{MemoryStore, Repositories};
use headshot_imaging::{GeneratedImage, GenerationError, ImageGenerator, SourceImage};
use headshot_types::{AccountId, CheckoutSession, CustomerId, PlanTier, PortalSession, StyleId};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const OPERATOR_SECRET: &str = "operator-secret-0123456789";

/// Provider double that hands out sequential ids
#[derive(Debug, Default)]
pub struct MockProvider {
    pub customers_created: AtomicUsize,
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn create_customer(
        &self,
        _account_id: AccountId,
        _email: &str,
    ) -> Result<CustomerId, BillingError> {
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst);
        Ok(CustomerId::new(format!("cus_api_{n}")))
    }

    async fn create_checkout_session(
        &self,
        customer_id: &CustomerId,
        _account_id: AccountId,
        tier: PlanTier,
        _success_url: &str,
        _cancel_url: &str,
    ) -> Result<CheckoutSession, BillingError> {
        Ok(CheckoutSession {
            session_id: format!("cs_{customer_id}"),
            url: format!("https://checkout.test/{customer_id}"),
            plan_tier: tier,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        _return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        Ok(PortalSession {
            url: format!("https://portal.test/{customer_id}"),
        })
    }
}

/// Generator that echoes a fixed PNG, or fails when told to
#[derive(Debug, Default)]
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    pub failure: Option<GenerationError>,
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(
        &self,
        _image: &SourceImage,
        _style: StyleId,
    ) -> Result<GeneratedImage, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(GeneratedImage {
                bytes: b"headshot".to_vec(),
                mime_type: "image/png".to_string(),
            }),
        }
    }
}

pub fn config() -> Config {
    let env: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "postgres://unused"),
        ("AUTH_JWT_SECRET", JWT_SECRET),
        ("OPERATOR_SECRET", OPERATOR_SECRET),
        ("STRIPE_SECRET_KEY", "sk_test"),
        ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("STRIPE_PRICE_PRO", "price_pro"),
        ("GEMINI_API_KEY", "gemini-test"),
        ("GENERATION_TIMEOUT_SECS", "5"),
        ("REQUEST_TIMEOUT_SECS", "30"),
    ]);
    Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap()
}

pub struct TestApp {
    pub store: MemoryStore,
    pub provider: Arc<MockProvider>,
    pub generator: Arc<FakeGenerator>,
    pub router: Router,
}

pub fn app() -> TestApp {
    app_with_generator(FakeGenerator::default())
}

pub fn app_with_generator(generator: FakeGenerator) -> TestApp {
    let store = MemoryStore::new();
    let provider = Arc::new(MockProvider::default());
    let generator = Arc::new(generator);
    let state = AppState::new(
        Repositories::in_memory(store.clone()),
        None,
        provider.clone(),
        generator.clone(),
        config(),
    );
    TestApp {
        store,
        provider,
        generator,
        router: build_router(state, None),
    }
}

/// HS256 token as issued by the identity provider
pub fn token(subject: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::default(),
        &json!({ "sub": subject, "email": format!("{subject}@example.com"), "exp": exp }),
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// Authenticated JSON request; `body` of `Value::Null` sends no body
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        subject: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        self.send(authed(method, uri, subject, &[], body)).await
    }

    /// Sign in `subject` and return its profile
    pub async fn ensure(&self, subject: &str) -> Value {
        let (status, body) = self
            .call("POST", "/api/v1/account/ensure", subject, Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }
}

pub fn authed(
    method: &str,
    uri: &str,
    subject: &str,
    headers: &[(&str, &str)],
    body: Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(subject)));
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    json_body(builder, body)
}

pub fn json_body(builder: axum::http::request::Builder, body: Value) -> Request<Body> {
    if body.is_null() {
        builder.body(Body::empty()).unwrap()
    } else {
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}
