//! Contract tests for the HTTP collaborator clients against wiremock.

use rosp_core::{AccountId, AgreementId, EmailAddress, SubscriptionId, Timestamp};
use rosp_gateway::{
    AgreementRenderRequest, AgreementRenderer, CheckoutRequest, CompanyRegistry, CustomerRequest,
    DocumentStore, Email, GatewayError, HttpAgreementRenderer, HttpCompanyRegistry,
    HttpDocumentStore, HttpMailer, HttpPaymentGateway, Mailer, PaymentGateway, RefundRequest,
    ServiceEndpoint,
};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(server: &MockServer) -> ServiceEndpoint {
    ServiceEndpoint::new(&server.uri(), "test-key").expect("endpoint")
}

// ── Payments ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_customer_sends_bearer_and_parses_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({"email": "ada@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "cus_123"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(endpoint(&server), 5).expect("client");
    let customer = gateway
        .create_customer(&CustomerRequest {
            email: EmailAddress::parse("Ada@Example.com").expect("email"),
            name: "Ada Lovelace".into(),
            account_id: AccountId::new(),
        })
        .await
        .expect("customer");
    assert_eq!(customer.id, "cus_123");
}

#[tokio::test]
async fn checkout_session_returns_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(body_partial_json(serde_json::json!({"customerRef": "cus_1", "amountMinor": 30000})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_1",
            "url": "https://pay.example.com/cs_1"
        })))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(endpoint(&server), 5).expect("client");
    let session = gateway
        .create_checkout_session(&CheckoutRequest {
            customer_ref: "cus_1".into(),
            subscription_id: SubscriptionId::new(),
            amount_minor: 30_000,
            currency: "GBP".into(),
            success_url: "https://portal.example.com/dashboard".into(),
            cancel_url: "https://portal.example.com/dashboard".into(),
        })
        .await
        .expect("session");
    assert_eq!(session.url, "https://pay.example.com/cs_1");
}

#[tokio::test]
async fn refund_carries_idempotency_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/refunds"))
        .and(header("Idempotency-Key", "refund-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "re_1",
            "status": "pending"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(endpoint(&server), 5).expect("client");
    let receipt = gateway
        .refund(&RefundRequest {
            transaction_id: "txn_1".into(),
            amount_minor: 30_000,
            currency: "GBP".into(),
            idempotency_key: "refund-abc".into(),
        })
        .await
        .expect("refund");
    assert_eq!(receipt.id, "re_1");
}

#[tokio::test]
async fn gateway_error_status_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/refunds"))
        .respond_with(ResponseTemplate::new(402).set_body_string("charge already refunded"))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(endpoint(&server), 5).expect("client");
    let err = gateway
        .refund(&RefundRequest {
            transaction_id: "txn_1".into(),
            amount_minor: 1,
            currency: "GBP".into(),
            idempotency_key: "refund-x".into(),
        })
        .await
        .unwrap_err();
    match err {
        GatewayError::Api { status, body, .. } => {
            assert_eq!(status, 402);
            assert_eq!(body, "charge already refunded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ── Mail / storage / renderer ────────────────────────────────────────

#[tokio::test]
async fn mailer_posts_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(body_partial_json(serde_json::json!({
            "from": "office@example.com",
            "to": "ada@example.com",
            "subject": "Welcome"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(endpoint(&server), "office@example.com", 5).expect("client");
    mailer
        .send(&Email::new(
            EmailAddress::parse("ada@example.com").expect("email"),
            "Welcome",
            "<p>Hello</p>",
        ))
        .await
        .expect("send");
}

#[tokio::test]
async fn document_store_puts_bytes_with_media_type() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/objects/agreements/a1.pdf"))
        .and(header("Content-Type", "application/pdf"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpDocumentStore::new(endpoint(&server), 5).expect("client");
    let stored = store
        .store("agreements/a1.pdf", b"%PDF-1.7", "application/pdf")
        .await
        .expect("store");
    assert_eq!(stored.key, "agreements/a1.pdf");
}

#[tokio::test]
async fn renderer_returns_raw_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/agreements"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 rendered".to_vec()))
        .mount(&server)
        .await;

    let renderer = HttpAgreementRenderer::new(endpoint(&server), 5).expect("client");
    let pdf = renderer
        .render(&AgreementRenderRequest {
            agreement_id: AgreementId::new(),
            template_version: 2,
            template_title: "Registered Office Agreement".into(),
            company_name: "Acme Ltd".into(),
            signer_name: "Ada Lovelace".into(),
            signer_email: "ada@example.com".into(),
            signature_kind: "typed".into(),
            signature_payload: "Ada Lovelace".into(),
            signed_at: Timestamp::now(),
        })
        .await
        .expect("render");
    assert_eq!(pdf, b"%PDF-1.7 rendered");
}

// ── Registry ─────────────────────────────────────────────────────────

#[tokio::test]
async fn registry_search_and_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/companies"))
        .and(query_param("q", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{"name": "ACME LTD", "number": "01234567", "status": "active"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/company/01234567"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "ACME LTD",
            "number": "01234567",
            "officers": [{"name": "LOVELACE, Ada", "role": "director"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/company/99999999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let registry = HttpCompanyRegistry::new(endpoint(&server), 5).expect("client");
    let hits = registry.search("acme").await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].status.as_deref(), Some("active"));

    let profile = registry.profile("01234567").await.expect("profile").expect("found");
    assert_eq!(profile.officers.len(), 1);

    assert!(registry.profile("99999999").await.expect("lookup").is_none());
}
