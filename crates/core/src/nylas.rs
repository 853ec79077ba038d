//! Nylas Email Client
//!
//! Sends email from the connected mailbox through the Nylas `/send`
//! endpoint, behind the [`EmailSender`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub const DEFAULT_API_BASE: &str = "https://api.nylas.com";

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Nylas API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// An email to be sent from the connected mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    /// Omitted when replying within an existing thread.
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailReceipt {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, email: OutboundEmail) -> Result<EmailReceipt, EmailError>;
}

#[derive(Serialize)]
struct Recipient<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    to: Vec<Recipient<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    body: &'a str,
}

#[derive(Deserialize)]
struct NylasErrorBody {
    message: Option<String>,
}

#[derive(Clone)]
pub struct NylasClient {
    http: reqwest::Client,
    access_token: String,
    api_base: String,
}

impl NylasClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_api_base(access_token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(access_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: access_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn send_url(&self) -> String {
        format!("{}/send", self.api_base)
    }
}

fn send_request(email: &OutboundEmail) -> SendRequest<'_> {
    SendRequest {
        to: vec![Recipient { email: &email.to }],
        subject: email.subject.as_deref(),
        body: &email.body,
    }
}

fn api_error(status: u16, body: &str) -> EmailError {
    let message = serde_json::from_str::<NylasErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.message)
        .unwrap_or_else(|| body.to_string());
    EmailError::Api { status, message }
}

#[async_trait]
impl EmailSender for NylasClient {
    #[instrument(skip_all, fields(to = %email.to))]
    async fn send_email(&self, email: OutboundEmail) -> Result<EmailReceipt, EmailError> {
        let response = self
            .http
            .post(self.send_url())
            .bearer_auth(&self.access_token)
            .json(&send_request(&email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let receipt: EmailReceipt = response.json().await?;
        debug!(id = %receipt.id, "Email accepted by Nylas");
        Ok(receipt)
    }
}
