//! Object storage for KYC uploads and signed agreements.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ServiceEndpoint;
use crate::error::GatewayError;
use crate::http::{build_client, send, Delivery};

/// Where a stored object ended up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredObject {
    pub key: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object.
    async fn store(
        &self,
        key: &str,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<StoredObject, GatewayError>;
}

/// reqwest-backed object storage client.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    http: reqwest::Client,
    endpoint: ServiceEndpoint,
}

impl HttpDocumentStore {
    pub fn new(endpoint: ServiceEndpoint, timeout_secs: u64) -> Result<Self, GatewayError> {
        let http = build_client(&endpoint, timeout_secs, "STORAGE_API_TOKEN")?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    /// Calls `PUT {base_url}/objects/{key}`. A PUT to the same key is
    /// repeatable.
    async fn store(
        &self,
        key: &str,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<StoredObject, GatewayError> {
        let endpoint = "PUT /objects/{key}";
        let url = self.endpoint.url(&format!("objects/{}", key.trim_start_matches('/')));
        send(endpoint, Delivery::Repeatable, || {
            self.http
                .put(&url)
                .header(reqwest::header::CONTENT_TYPE, media_type)
                .body(bytes.to_vec())
        })
        .await?;
        Ok(StoredObject {
            key: key.to_string(),
            url: Some(url),
        })
    }
}
