//! Twilio REST Client
//!
//! A thin client for the two Twilio REST operations the actions need:
//! creating an outbound SMS and redirecting a live call to new TwiML.
//! Both are exposed behind traits so actions can be exercised without
//! network access.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac, digest::InvalidLength};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tracing::{debug, instrument};

type HmacSha1 = Hmac<Sha1>;

pub const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Errors raised while talking to the messaging API.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Twilio API error (status {status}, code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },
}

/// Account credentials for the Twilio REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
}

/// A text message to be created through the messaging API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSms {
    pub from: String,
    pub to: String,
    pub body: String,
}

/// The subset of Twilio's message resource we care about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageReceipt {
    pub sid: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Anything that can deliver an SMS.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, sms: OutboundSms) -> Result<MessageReceipt, MessagingError>;
}

/// Anything that can take over a live call with new TwiML.
#[async_trait]
pub trait CallController: Send + Sync {
    async fn redirect_call(&self, call_sid: &str, twiml: &str) -> Result<(), MessagingError>;
}

#[derive(Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

/// Client for the Twilio 2010-04-01 REST API.
#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    config: TwilioConfig,
    api_base: String,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> Self {
        Self::with_api_base(config, DEFAULT_API_BASE)
    }

    /// Creates a client against a non-default API host.
    pub fn with_api_base(config: TwilioConfig, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn account_url(&self, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{}",
            self.api_base, self.config.account_sid, resource
        )
    }

    async fn post_form<T: Serialize + ?Sized>(
        &self,
        url: &str,
        form: &T,
    ) -> Result<reqwest::Response, MessagingError> {
        let response = self
            .http
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(api_error(status.as_u16(), &body))
    }
}

/// Builds an `Api` error from a non-2xx response body.
fn api_error(status: u16, body: &str) -> MessagingError {
    match serde_json::from_str::<TwilioErrorBody>(body) {
        Ok(parsed) => MessagingError::Api {
            status,
            code: parsed.code,
            message: parsed.message.unwrap_or_else(|| body.to_string()),
        },
        Err(_) => MessagingError::Api {
            status,
            code: None,
            message: body.to_string(),
        },
    }
}

/// Computes the `X-Twilio-Signature` for a webhook request.
///
/// Twilio signs the full request URL followed by every POST parameter,
/// sorted by name, as `name` + `value` with no separators. The digest is an
/// HMAC-SHA1 keyed with the account auth token, base64 encoded.
pub fn request_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
) -> Result<String, InvalidLength> {
    let mac = signature_mac(auth_token, url, params)?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Checks a webhook's `X-Twilio-Signature` header in constant time.
pub fn verify_request_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    match signature_mac(auth_token, url, params) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

fn signature_mac(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
) -> Result<HmacSha1, InvalidLength> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())?;
    mac.update(url.as_bytes());
    for (name, value) in sorted {
        mac.update(name.as_bytes());
        mac.update(value.as_bytes());
    }
    Ok(mac)
}

#[async_trait]
impl SmsSender for TwilioClient {
    #[instrument(skip_all, fields(to = %sms.to))]
    async fn send_sms(&self, sms: OutboundSms) -> Result<MessageReceipt, MessagingError> {
        let url = self.account_url("Messages.json");
        let form = [
            ("Body", sms.body.as_str()),
            ("From", sms.from.as_str()),
            ("To", sms.to.as_str()),
        ];
        let receipt: MessageReceipt = self.post_form(&url, &form).await?.json().await?;
        debug!(sid = %receipt.sid, status = ?receipt.status, "SMS accepted by Twilio");
        Ok(receipt)
    }
}

#[async_trait]
impl CallController for TwilioClient {
    #[instrument(skip(self, twiml))]
    async fn redirect_call(&self, call_sid: &str, twiml: &str) -> Result<(), MessagingError> {
        let url = self.account_url(&format!("Calls/{}.json", call_sid));
        self.post_form(&url, &[("Twiml", twiml)]).await?;
        debug!("Call redirected");
        Ok(())
    }
}
