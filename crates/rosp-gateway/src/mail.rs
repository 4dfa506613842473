//! Transactional email delivery.

use async_trait::async_trait;
use serde::Serialize;

use rosp_core::EmailAddress;

use crate::config::ServiceEndpoint;
use crate::error::GatewayError;
use crate::http::{self, build_client, Delivery};

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: EmailAddress,
    pub subject: String,
    pub html: String,
}

impl Email {
    pub fn new(to: EmailAddress, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to,
            subject: subject.into(),
            html: html.into(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), GatewayError>;
}

/// reqwest-backed mail API client.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    http: reqwest::Client,
    endpoint: ServiceEndpoint,
    from: String,
}

#[derive(Serialize)]
struct SendBody<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl HttpMailer {
    pub fn new(
        endpoint: ServiceEndpoint,
        from: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, GatewayError> {
        let http = build_client(&endpoint, timeout_secs, "MAILER_API_TOKEN")?;
        Ok(Self {
            http,
            endpoint,
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    /// Calls `POST {base_url}/send`. Not retried: a duplicate send is
    /// worse than a logged failure.
    async fn send(&self, email: &Email) -> Result<(), GatewayError> {
        let endpoint = "POST /send";
        let url = self.endpoint.url("send");
        let body = SendBody {
            from: &self.from,
            to: email.to.as_str(),
            subject: &email.subject,
            html: &email.html,
        };
        http::send(endpoint, Delivery::Once, || self.http.post(&url).json(&body)).await?;
        Ok(())
    }
}
