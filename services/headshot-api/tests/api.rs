//! Router tests over the in-memory store

mod common;

use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use headshot_billing_core::signature_header;
use headshot_imaging::GenerationError;
use serde_json::{json, Value};

use common::{app, app_with_generator, authed, json_body, FakeGenerator, OPERATOR_SECRET, WEBHOOK_SECRET};

const SELFIE: &str = "data:image/jpeg;base64,c2VsZmll";

fn headshot_body(style: &str) -> Value {
    json!({ "image_base64": SELFIE, "style": style })
}

fn signed_webhook(event: &Value) -> Request<Body> {
    let body = event.to_string();
    let signature = signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), &body).unwrap();
    Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("stripe-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

fn checkout_completed(id: &str, customer: &str, tier: &str) -> Value {
    json!({
        "id": id,
        "type": "checkout.session.completed",
        "created": Utc::now().timestamp(),
        "data": { "object": {
            "id": format!("cs_{id}"),
            "customer": customer,
            "subscription": "sub_api_1",
            "metadata": { "plan_tier": tier }
        }}
    })
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = app();

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "in-memory");
}

#[tokio::test]
async fn test_requests_without_valid_token_are_rejected() {
    let app = app();

    let request = Request::builder()
        .uri("/api/v1/account")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "MISSING_TOKEN");

    let request = Request::builder()
        .uri("/api/v1/account")
        .header(header::AUTHORIZATION, "Bearer not.a.jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_ensure_account_is_idempotent() {
    let app = app();

    let (status, body) = app.call("GET", "/api/v1/account", "alice", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "ACCOUNT_NOT_FOUND");

    let first = app.ensure("alice").await;
    assert_eq!(first["plan"], "free");
    assert_eq!(first["credits"], 10);
    assert_eq!(first["subscription_status"], "none");
    assert_eq!(first["unlimited"], false);

    let second = app.ensure("alice").await;
    assert_eq!(second["id"], first["id"]);

    let (status, profile) = app.call("GET", "/api/v1/account", "alice", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["id"], first["id"]);
    assert_eq!(profile["email"], "alice@example.com");
}

#[tokio::test]
async fn test_headshot_requires_idempotency_key() {
    let app = app();
    app.ensure("bob").await;

    let (status, body) = app
        .call("POST", "/api/v1/headshots", "bob", headshot_body("corporate"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_headshot_spends_credits_until_payment_required() {
    let app = app();
    app.ensure("carol").await;

    let request = authed(
        "POST",
        "/api/v1/headshots",
        "carol",
        &[("idempotency-key", "gen-0")],
        headshot_body("tech"),
    );
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["style"], "tech");
    assert_eq!(body["credits_remaining"], 9);
    assert!(body["image_data_url"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    // a delivered key is spent: no second image, no second charge
    let request = authed(
        "POST",
        "/api/v1/headshots",
        "carol",
        &[("idempotency-key", "gen-0")],
        headshot_body("executive"),
    );
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "IDEMPOTENCY_KEY_USED");
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), 1);

    for i in 1..10 {
        let key = format!("gen-{i}");
        let request = authed(
            "POST",
            "/api/v1/headshots",
            "carol",
            &[("idempotency-key", key.as_str())],
            headshot_body("casual"),
        );
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);
    }

    let calls_before = app.generator.calls.load(Ordering::SeqCst);
    let request = authed(
        "POST",
        "/api/v1/headshots",
        "carol",
        &[("idempotency-key", "gen-10")],
        headshot_body("casual"),
    );
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_CREDITS");
    assert_eq!(body["error"]["requires_upgrade"], true);
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), calls_before);

    let (_, profile) = app.call("GET", "/api/v1/account", "carol", Value::Null).await;
    assert_eq!(profile["credits"], 0);
}

#[tokio::test]
async fn test_headshot_rejects_bad_input_without_charging() {
    let app = app();
    app.ensure("dave").await;

    let request = authed(
        "POST",
        "/api/v1/headshots",
        "dave",
        &[("idempotency-key", "bad-style")],
        headshot_body("renaissance"),
    );
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = authed(
        "POST",
        "/api/v1/headshots",
        "dave",
        &[("idempotency-key", "bad-image")],
        json!({ "image_base64": "***", "style": "corporate" }),
    );
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, profile) = app.call("GET", "/api/v1/account", "dave", Value::Null).await;
    assert_eq!(profile["credits"], 10);
}

#[tokio::test]
async fn test_transient_generation_failure_is_retryable_and_keeps_debit() {
    let app = app_with_generator(FakeGenerator {
        failure: Some(GenerationError::Transient("rate limited".into())),
        ..Default::default()
    });
    app.ensure("erin").await;

    let request = authed(
        "POST",
        "/api/v1/headshots",
        "erin",
        &[("idempotency-key", "try-1")],
        headshot_body("medical"),
    );
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["retryable"], true);
    assert!(!body.to_string().contains("rate limited"));

    let (_, profile) = app.call("GET", "/api/v1/account", "erin", Value::Null).await;
    assert_eq!(profile["credits"], 9);
}

#[tokio::test]
async fn test_permanent_generation_failure_is_unprocessable() {
    let app = app_with_generator(FakeGenerator {
        failure: Some(GenerationError::Permanent("no image returned".into())),
        ..Default::default()
    });
    app.ensure("fay").await;

    let request = authed(
        "POST",
        "/api/v1/headshots",
        "fay",
        &[("idempotency-key", "try-1")],
        headshot_body("executive"),
    );
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].get("retryable").is_none());
}

#[tokio::test]
async fn test_checkout_and_portal() {
    let app = app();
    app.ensure("gus").await;

    let (status, body) = app
        .call("POST", "/api/v1/billing/portal", "gus", Value::Null)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "CUSTOMER_NOT_FOUND");

    // basic has no configured price
    let (status, _) = app
        .call("POST", "/api/v1/billing/checkout", "gus", json!({ "plan_tier": "basic" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call("POST", "/api/v1/billing/checkout", "gus", json!({ "plan_tier": "platinum" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.provider.customers_created.load(Ordering::SeqCst), 0);

    let (status, body) = app
        .call("POST", "/api/v1/billing/checkout", "gus", json!({ "plan_tier": "pro" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["url"], "https://checkout.test/cus_api_0");
    assert_eq!(body["plan_tier"], "pro");

    // the customer is reused
    app.call("POST", "/api/v1/billing/checkout", "gus", json!({ "plan_tier": "pro" }))
        .await;
    assert_eq!(app.provider.customers_created.load(Ordering::SeqCst), 1);

    let (status, body) = app
        .call("POST", "/api/v1/billing/portal", "gus", Value::Null)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://portal.test/cus_api_0");
}

#[tokio::test]
async fn test_webhook_upgrades_account() {
    let app = app();
    app.ensure("hana").await;
    app.call("POST", "/api/v1/billing/checkout", "hana", json!({ "plan_tier": "pro" }))
        .await;

    let event = checkout_completed("evt_api_1", "cus_api_0", "pro");
    let (status, body) = app.send(signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");

    let (status, body) = app.send(signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");

    let (_, profile) = app.call("GET", "/api/v1/account", "hana", Value::Null).await;
    assert_eq!(profile["plan"], "paid");
    assert_eq!(profile["plan_tier"], "pro");
    assert_eq!(profile["subscription_status"], "active");
    assert_eq!(profile["unlimited"], true);
}

#[tokio::test]
async fn test_webhook_for_unknown_customer_is_acknowledged() {
    let app = app();
    let event = checkout_completed("evt_orphan", "cus_nobody", "pro");

    let (status, body) = app.send(signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "reconciliation");
    assert_eq!(app.store.reconciliation_queue().await.len(), 1);
}

#[tokio::test]
async fn test_webhook_with_bad_signature_stores_nothing() {
    let app = app();
    let event = checkout_completed("evt_forged", "cus_api_0", "unlimited");
    let body = event.to_string();
    let forged = signature_header("whsec_other", Utc::now().timestamp(), &body).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("stripe-signature", forged)
        .body(Body::from(body.clone()))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.store.event_outcome("evt_forged").await.is_none());

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .body(Body::from(body))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mobile_upload_hand_off() {
    let app = app();
    app.ensure("ivan").await;

    let (status, session) = app
        .call("POST", "/api/v1/mobile-uploads/sessions", "ivan", Value::Null)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = session["session_id"].as_str().unwrap().to_string();

    // the phone has no token
    let upload = json!({
        "file_url": "https://files.test/selfie.jpg",
        "filename": "selfie.jpg",
        "original_name": "IMG_0001.jpg",
        "content_type": "image/jpeg",
        "size_bytes": 4096
    });
    let request = json_body(
        Request::builder()
            .method("POST")
            .uri(format!("/api/v1/mobile-uploads/sessions/{session_id}/uploads")),
        upload.clone(),
    );
    let (status, stored) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED, "{stored}");
    assert_eq!(stored["filename"], "selfie.jpg");

    let mut pdf = upload;
    pdf["content_type"] = json!("application/pdf");
    let request = json_body(
        Request::builder()
            .method("POST")
            .uri(format!("/api/v1/mobile-uploads/sessions/{session_id}/uploads")),
        pdf,
    );
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/v1/mobile-uploads/sessions/{session_id}");
    let (status, taken) = app.call("GET", &uri, "ivan", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(taken["uploads"].as_array().unwrap().len(), 1);

    let (_, again) = app.call("GET", &uri, "ivan", Value::Null).await;
    assert!(again["uploads"].as_array().unwrap().is_empty());

    let (status, _) = app
        .call("GET", "/api/v1/mobile-uploads/sessions/not-a-uuid", "ivan", Value::Null)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = format!("/api/v1/mobile-uploads/sessions/{}", uuid_like());
    let (status, body) = app.call("GET", &unknown, "ivan", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
}

fn uuid_like() -> &'static str {
    "6f1c2b4e-9d3a-4f7e-8a10-2c5b7d9e0f11"
}

#[tokio::test]
async fn test_purge_requires_operator_secret() {
    let app = app();

    let request = Request::builder()
        .method("POST")
        .uri("/internal/mobile-uploads/purge")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/internal/mobile-uploads/purge")
        .header(header::AUTHORIZATION, "Bearer wrong-secret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // a user token is not an operator credential
    let request = authed("POST", "/internal/mobile-uploads/purge", "jo", &[], Value::Null);
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/internal/mobile-uploads/purge")
        .header(header::AUTHORIZATION, format!("Bearer {OPERATOR_SECRET}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["purged"], 0);
}
