//! Webhook and Call Models
//!
//! This module defines the form payloads Twilio posts to our webhooks and
//! the per-call record kept by the config manager.

use chrono::{DateTime, Utc};
use receptionist_core::agent::{AgentConfig, Transcript};
use serde::{Deserialize, Serialize};

/// Fields of Twilio's voice webhook request we use.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TwilioCallForm {
    pub call_sid: String,
    pub account_sid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// The callback Twilio posts after a `<Gather input="speech">`.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TwilioSpeechForm {
    pub call_sid: Option<String>,
    pub account_sid: Option<String>,
    pub speech_result: Option<String>,
    pub confidence: Option<f32>,
}

/// Twilio's call status callback.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TwilioStatusForm {
    pub call_sid: String,
    pub account_sid: Option<String>,
    pub call_status: String,
}

impl TwilioStatusForm {
    /// Statuses after which the call will never produce another webhook.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.call_status.as_str(),
            "completed" | "busy" | "failed" | "no-answer" | "canceled"
        )
    }
}

/// Everything needed to continue a call on its next webhook.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CallConfig {
    pub conversation_id: String,
    pub call_sid: String,
    pub from_phone: Option<String>,
    pub to_phone: Option<String>,
    pub agent_config: AgentConfig,
    pub transcript: Transcript,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
