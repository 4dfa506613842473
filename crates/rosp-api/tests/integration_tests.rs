//! Router-level tests: the full middleware stack against an in-memory
//! engine and mock collaborators, driven with `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use rosp_api::state::{AppConfig, AppState};
use rosp_core::{AccountId, SubscriptionId, Timestamp};
use rosp_gateway::mock::MockSet;
use rosp_gateway::webhook::SIGNATURE_HEADER;
use rosp_gateway::WebhookVerifier;
use rosp_lifecycle::{Engine, EngineConfig, Ledger};

const WEBHOOK_SECRET: &str = "whsec_test";
const BOUNDARY: &str = "rosp-test-boundary";

// ─── Helpers ────────────────────────────────────────────────────────

fn test_app_with(config: AppConfig) -> Router {
    let mocks = MockSet::new();
    let engine = Engine::new(Ledger::in_memory(), mocks.collaborators(), EngineConfig::default());
    let state = AppState::new(engine, Some(WebhookVerifier::new(WEBHOOK_SECRET)), config);
    rosp_api::app(state)
}

fn test_app() -> Router {
    test_app_with(AppConfig::default())
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn registration_body(email: &str, company_number: &str) -> Vec<u8> {
    let payload = json!({
        "email": email,
        "password": "correct-horse-9",
        "contactName": "Ada Lovelace",
        "company": {
            "name": "Engines Ltd",
            "number": company_number,
            "companyType": "ltd",
            "registeredAddress": {"line1": "12 Analytical Row", "city": "London", "postcode": "N1 9GU"}
        },
        "director": {"fullName": "Ada Lovelace", "nationality": "GB"},
        "agreement": {"signatureKind": "typed", "signaturePayload": "Ada Lovelace"}
    });

    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"payload\"\r\n\r\n{payload}\r\n"
        )
        .as_bytes(),
    );
    for (name, filename, media_type) in [
        ("identity_document", "passport.pdf", "application/pdf"),
        ("address_proof", "bill.jpg", "image/jpeg"),
    ] {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {media_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"%PDF-1.7 scan");
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn registration_request(email: &str, company_number: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/registrations")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(registration_body(email, company_number)))
        .unwrap()
}

/// Register and return `(account_id, subscription_id)` as strings.
async fn register(app: &Router, email: &str, company_number: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(registration_request(email, company_number))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let receipt = body_json(response).await;
    (
        receipt["userId"].as_str().unwrap().to_string(),
        receipt["subscriptionId"].as_str().unwrap().to_string(),
    )
}

fn signed_webhook(body: &Value) -> Request<Body> {
    let raw = serde_json::to_vec(body).unwrap();
    let signature = WebhookVerifier::new(WEBHOOK_SECRET)
        .sign(&raw, Timestamp::now().epoch_secs())
        .unwrap();
    Request::builder()
        .method("POST")
        .uri("/v1/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(raw))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ─── Health & Docs ──────────────────────────────────────────────────

#[tokio::test]
async fn health_checks_answer_without_credentials() {
    let app = test_app_with(AppConfig {
        auth_token: Some("s3cret".into()),
        ..AppConfig::default()
    });

    let response = app.clone().oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");

    let response = app.oneshot(get("/health/readiness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ready");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let response = test_app().oneshot(get("/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let spec = body_json(response).await;
    assert!(spec["paths"]["/v1/registrations"].is_object());
}

// ─── Registration ───────────────────────────────────────────────────

#[tokio::test]
async fn registration_returns_receipt_and_blocks_duplicates() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(registration_request("ada@example.com", "ENG001"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let receipt = body_json(response).await;
    assert_eq!(receipt["coreCommitted"], json!(true));
    assert!(receipt["checkoutUrl"].is_string());

    let response = app
        .clone()
        .oneshot(registration_request("ADA@example.com", "OTHER1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "DUPLICATE_IDENTITY");
    assert_eq!(body["error"]["details"]["emailTaken"], json!(true));
    assert_eq!(body["error"]["details"]["companyTaken"], json!(false));

    let response = app
        .oneshot(get(
            "/v1/registrations/availability?email=ada%40example.com&companyNumber=ENG001",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["available"], json!(false));
    assert_eq!(body["companyTaken"], json!(true));
}

#[tokio::test]
async fn registration_without_payload_is_bad_request() {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/v1/registrations")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registration_submissions_are_rate_limited() {
    let app = test_app_with(AppConfig {
        registration_rate_limit: 1,
        ..AppConfig::default()
    });
    register(&app, "first@example.com", "RATE01").await;

    let response = app
        .oneshot(registration_request("second@example.com", "RATE02"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

// ─── Payments & Admin ───────────────────────────────────────────────

#[tokio::test]
async fn signed_payment_then_approval_activates() {
    let app = test_app();
    let (_, sub) = register(&app, "pay@example.com", "PAY001").await;

    let event = json!({
        "type": "payment.succeeded",
        "transactionId": "txn_pay_1",
        "subscriptionId": sub,
        "amount": 30000
    });
    let response = app.clone().oneshot(signed_webhook(&event)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "applied");
    assert_eq!(body["report"]["status"], "PENDING_APPROVAL");

    // Redelivery is acknowledged, not reapplied.
    let response = app.clone().oneshot(signed_webhook(&event)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "duplicate");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/v1/admin/subscriptions/{sub}/actions"),
            json!({"action": "APPROVE"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["from"], "PENDING_APPROVAL");
    assert_eq!(outcome["to"], "ACTIVE");

    let response = app
        .oneshot(get(&format!("/v1/subscriptions/{sub}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let overview = body_json(response).await;
    assert_eq!(overview["subscription"]["status"], "ACTIVE");
    assert_eq!(overview["payments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_unauthorized() {
    let app = test_app();
    let (_, sub) = register(&app, "sig@example.com", "SIG001").await;
    let raw = json!({
        "type": "payment.succeeded",
        "transactionId": "txn_sig",
        "subscriptionId": sub,
        "amount": 30000
    })
    .to_string();
    let signature = WebhookVerifier::new("whsec_wrong")
        .sign(raw.as_bytes(), Timestamp::now().epoch_secs())
        .unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/payments")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(raw))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_action_errors_map_to_status_codes() {
    let app = test_app();
    let (_, sub) = register(&app, "draft@example.com", "DRF001").await;
    let uri = format!("/v1/admin/subscriptions/{sub}/actions");

    let response = app
        .clone()
        .oneshot(json_request("POST", &uri, json!({"action": "PROMOTE"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(json_request("POST", &uri, json!({"action": "APPROVE"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"]["code"], "CONFLICT");

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/v1/admin/subscriptions/{}/actions", SubscriptionId::new()),
            json!({"action": "CANCEL"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn renewal_sweep_and_audit_verification_run_on_demand() {
    let app = test_app();
    register(&app, "sweep@example.com", "SWP001").await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/v1/admin/renewals/sweep", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert!(report["expired"].as_array().unwrap().is_empty());

    let response = app.oneshot(get("/v1/admin/audit/verify")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["chainValid"], json!(true));
}

// ─── Authorization ──────────────────────────────────────────────────

#[tokio::test]
async fn clients_see_only_their_own_subscription() {
    let secret = "s3cret";
    let app = test_app_with(AppConfig {
        auth_token: Some(secret.into()),
        ..AppConfig::default()
    });
    let (owner, sub) = register(&app, "owner@example.com", "OWN001").await;
    let uri = format!("/v1/subscriptions/{sub}");

    let response = app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let as_client = |account: &str| {
        Request::builder()
            .uri(&uri)
            .header(header::AUTHORIZATION, format!("Bearer client:{account}:{secret}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(as_client(&owner)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stranger = AccountId::new().to_string();
    let response = app.clone().oneshot(as_client(&stranger)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/admin/renewals/sweep")
        .header(header::AUTHORIZATION, format!("Bearer client:{owner}:{secret}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn client_reads_and_clears_own_notifications() {
    let secret = "s3cret";
    let app = test_app_with(AppConfig {
        auth_token: Some(secret.into()),
        ..AppConfig::default()
    });
    let (owner, _) = register(&app, "inbox@example.com", "INB001").await;
    let bearer = format!("Bearer client:{owner}:{secret}");

    let request = Request::builder()
        .uri("/v1/notifications")
        .header(header::AUTHORIZATION, &bearer)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert_eq!(list["unread"], json!(1));
    let id = list["items"][0]["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("POST")
        .uri(format!("/v1/notifications/{id}/read"))
        .header(header::AUTHORIZATION, &bearer)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["read"], json!(true));
}
