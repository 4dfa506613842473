//! Payment gateway client: customers, hosted checkout sessions, refunds.
//!
//! Only the gateway's API contract is modelled here; its hosted checkout UI
//! is out of reach. Inbound events are handled by [`crate::webhook`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rosp_core::{AccountId, EmailAddress, SubscriptionId};

use crate::config::ServiceEndpoint;
use crate::error::GatewayError;
use crate::http::{build_client, decode, send, Delivery};

/// Request to create a gateway customer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRequest {
    pub email: EmailAddress,
    pub name: String,
    pub account_id: AccountId,
}

/// A customer record at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayCustomer {
    pub id: String,
}

/// Request for a hosted checkout session covering one annual fee.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer_ref: String,
    /// Echoed back on payment events so they can be matched to a subscription.
    pub subscription_id: SubscriptionId,
    pub amount_minor: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Request to refund a settled charge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    /// Gateway transaction id of the original charge.
    pub transaction_id: String,
    pub amount_minor: i64,
    pub currency: String,
    /// Sent as the `Idempotency-Key` header, not in the body.
    #[serde(skip)]
    pub idempotency_key: String,
}

/// Gateway acknowledgement of a refund request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefundReceipt {
    pub id: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(&self, req: &CustomerRequest) -> Result<GatewayCustomer, GatewayError>;

    async fn create_checkout_session(
        &self,
        req: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Request a refund. Repeating a call with the same idempotency key must
    /// not refund twice.
    async fn refund(&self, req: &RefundRequest) -> Result<RefundReceipt, GatewayError>;
}

/// reqwest-backed payment gateway client.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    endpoint: ServiceEndpoint,
}

impl HttpPaymentGateway {
    pub fn new(endpoint: ServiceEndpoint, timeout_secs: u64) -> Result<Self, GatewayError> {
        let http = build_client(&endpoint, timeout_secs, "PAYMENTS_SECRET_KEY")?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    /// Calls `POST {base_url}/v1/customers`.
    async fn create_customer(&self, req: &CustomerRequest) -> Result<GatewayCustomer, GatewayError> {
        let endpoint = "POST /v1/customers";
        let url = self.endpoint.url("v1/customers");
        let resp = send(endpoint, Delivery::Once, || self.http.post(&url).json(req)).await?;
        decode(endpoint, resp).await
    }

    /// Calls `POST {base_url}/v1/checkout/sessions`.
    async fn create_checkout_session(
        &self,
        req: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let endpoint = "POST /v1/checkout/sessions";
        let url = self.endpoint.url("v1/checkout/sessions");
        let resp = send(endpoint, Delivery::Once, || self.http.post(&url).json(req)).await?;
        decode(endpoint, resp).await
    }

    /// Calls `POST {base_url}/v1/refunds` with an `Idempotency-Key` header,
    /// resending on transient failures under the same key.
    async fn refund(&self, req: &RefundRequest) -> Result<RefundReceipt, GatewayError> {
        let endpoint = "POST /v1/refunds";
        let url = self.endpoint.url("v1/refunds");
        let delivery = Delivery::Keyed(&req.idempotency_key);
        let resp = send(endpoint, delivery, || self.http.post(&url).json(req)).await?;
        decode(endpoint, resp).await
    }
}
