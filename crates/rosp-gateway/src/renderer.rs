//! Agreement document rendering.

use async_trait::async_trait;
use serde::Serialize;

use rosp_core::{AgreementId, Timestamp};

use crate::config::ServiceEndpoint;
use crate::error::GatewayError;
use crate::http::{build_client, send, Delivery};

/// Everything the renderer needs to produce a signed agreement PDF.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementRenderRequest {
    pub agreement_id: AgreementId,
    pub template_version: i32,
    pub template_title: String,
    pub company_name: String,
    pub signer_name: String,
    pub signer_email: String,
    /// `typed` or `drawn`.
    pub signature_kind: String,
    /// Typed name, or a data URI for a drawn signature.
    pub signature_payload: String,
    pub signed_at: Timestamp,
}

#[async_trait]
pub trait AgreementRenderer: Send + Sync {
    /// Render the agreement, returning PDF bytes.
    async fn render(&self, req: &AgreementRenderRequest) -> Result<Vec<u8>, GatewayError>;
}

/// reqwest-backed document rendering client.
#[derive(Debug, Clone)]
pub struct HttpAgreementRenderer {
    http: reqwest::Client,
    endpoint: ServiceEndpoint,
}

impl HttpAgreementRenderer {
    pub fn new(endpoint: ServiceEndpoint, timeout_secs: u64) -> Result<Self, GatewayError> {
        let http = build_client(&endpoint, timeout_secs, "RENDERER_API_TOKEN")?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl AgreementRenderer for HttpAgreementRenderer {
    /// Calls `POST {base_url}/documents/agreements`.
    async fn render(&self, req: &AgreementRenderRequest) -> Result<Vec<u8>, GatewayError> {
        let endpoint = "POST /documents/agreements";
        let url = self.endpoint.url("documents/agreements");
        let resp = send(endpoint, Delivery::Repeatable, || self.http.post(&url).json(req)).await?;
        let bytes = resp.bytes().await.map_err(|e| GatewayError::Deserialization {
            endpoint: endpoint.into(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}
