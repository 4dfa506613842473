//! Company-registry lookup, used to prefill company details on the
//! registration form.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ServiceEndpoint;
use crate::error::GatewayError;
use crate::http::{build_client, decode, send, Delivery};

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySummary {
    pub name: String,
    pub number: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// A company officer (director or secretary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Officer {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub appointed_on: Option<String>,
}

/// Full company profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub name: String,
    pub number: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub incorporated_on: Option<String>,
    #[serde(default)]
    pub registered_address: Option<String>,
    #[serde(default)]
    pub officers: Vec<Officer>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<CompanySummary>,
}

#[async_trait]
pub trait CompanyRegistry: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<CompanySummary>, GatewayError>;

    /// `Ok(None)` when the registry has no company with that number.
    async fn profile(&self, number: &str) -> Result<Option<CompanyProfile>, GatewayError>;
}

/// reqwest-backed registry client.
#[derive(Debug, Clone)]
pub struct HttpCompanyRegistry {
    http: reqwest::Client,
    endpoint: ServiceEndpoint,
}

impl HttpCompanyRegistry {
    pub fn new(endpoint: ServiceEndpoint, timeout_secs: u64) -> Result<Self, GatewayError> {
        let http = build_client(&endpoint, timeout_secs, "REGISTRY_API_KEY")?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl CompanyRegistry for HttpCompanyRegistry {
    /// Calls `GET {base_url}/search/companies?q={query}`.
    async fn search(&self, query: &str) -> Result<Vec<CompanySummary>, GatewayError> {
        let endpoint = "GET /search/companies";
        let url = self.endpoint.url("search/companies");
        let resp = send(endpoint, Delivery::Repeatable, || {
            self.http.get(&url).query(&[("q", query)])
        })
        .await?;
        let body: SearchResponse = decode(endpoint, resp).await?;
        Ok(body.items)
    }

    /// Calls `GET {base_url}/company/{number}`.
    async fn profile(&self, number: &str) -> Result<Option<CompanyProfile>, GatewayError> {
        let endpoint = "GET /company/{number}";
        let url = self.endpoint.url(&format!("company/{number}"));
        match send(endpoint, Delivery::Repeatable, || self.http.get(&url)).await {
            Ok(resp) => decode(endpoint, resp).await.map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
