//! Agent Actions
//!
//! An action is a named, side-effecting operation the conversational agent
//! may invoke mid-dialogue through LLM tool calling. Each action is selected
//! by a serializable [`ActionConfig`] and instantiated by an
//! [`ActionFactory`].

pub mod factory;
pub mod schedule_appointment;
pub mod send_email;
pub mod transfer_call;

pub use factory::{ReceptionistActionFactory, StandardActionFactory};
pub use schedule_appointment::ScheduleAppointmentAction;
pub use send_email::SendEmailAction;
pub use transfer_call::TransferCallAction;

use crate::{nylas::EmailError, twilio::MessagingError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// The kinds of action the agent knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "action_twilio_schedule_appointment")]
    TwilioScheduleAppointment,
    #[serde(rename = "action_transfer_call")]
    TransferCall,
    #[serde(rename = "action_nylas_send_email")]
    NylasSendEmail,
}

impl ActionType {
    /// The wire tag, also used as the tool name exposed to the LLM.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::TwilioScheduleAppointment => "action_twilio_schedule_appointment",
            ActionType::TransferCall => "action_transfer_call",
            ActionType::NylasSendEmail => "action_nylas_send_email",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration record selecting an action. Carries no behaviour itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionConfig {
    #[serde(rename = "action_twilio_schedule_appointment")]
    TwilioScheduleAppointment,
    #[serde(rename = "action_transfer_call")]
    TransferCall { to_phone: String },
    #[serde(rename = "action_nylas_send_email")]
    NylasSendEmail,
}

impl ActionConfig {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionConfig::TwilioScheduleAppointment => ActionType::TwilioScheduleAppointment,
            ActionConfig::TransferCall { .. } => ActionType::TransferCall,
            ActionConfig::NylasSendEmail => ActionType::NylasSendEmail,
        }
    }
}

/// Errors raised by action construction or execution.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Invalid action type: {0}")]
    InvalidActionType(ActionType),
    #[error("Malformed action input: {0}")]
    MalformedInput(String),
    #[error("Action requires an active call, but no call SID was provided")]
    NoActiveCall,
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error(transparent)]
    Email(#[from] EmailError),
}

/// Everything an action receives when the agent invokes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInput {
    pub conversation_id: String,
    /// The telephony provider's identifier for the live call, if any.
    pub call_sid: Option<String>,
    /// Raw tool-call arguments produced by the LLM.
    pub params: serde_json::Value,
}

/// The result of a completed action, fed back to the LLM as a tool message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutput {
    pub action_type: ActionType,
    pub response: serde_json::Value,
}

/// A side-effecting operation the agent can call.
#[async_trait]
pub trait Action: Send + Sync {
    fn action_type(&self) -> ActionType;

    /// Natural-language description shown to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn run(&self, input: ActionInput) -> Result<ActionOutput, ActionError>;
}

/// Maps an [`ActionConfig`] to a concrete action instance.
pub trait ActionFactory: Send + Sync {
    fn create_action(&self, config: &ActionConfig) -> Result<Arc<dyn Action>, ActionError>;
}
