//! Email follow-up through Nylas.

use super::{Action, ActionError, ActionInput, ActionOutput, ActionType};
use crate::nylas::{EmailSender, OutboundEmail};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const DESCRIPTION: &str = "Sends an email using Nylas API. The input to this action is the recipient email, \
email body, optional subject. Make sure to include the proper greeting and closing in the email body.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SendEmailParameters {
    /// The email address of the recipient.
    pub recipient_email: String,
    /// The body of the email.
    pub body: String,
    /// The subject of the email.
    #[serde(default)]
    pub subject: Option<String>,
}

pub struct SendEmailAction {
    sender: Arc<dyn EmailSender>,
}

impl SendEmailAction {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Action for SendEmailAction {
    fn action_type(&self) -> ActionType {
        ActionType::NylasSendEmail
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(SendEmailParameters))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    async fn run(&self, input: ActionInput) -> Result<ActionOutput, ActionError> {
        let params: SendEmailParameters = serde_json::from_value(input.params)
            .map_err(|e| ActionError::MalformedInput(e.to_string()))?;
        let to = params.recipient_email.trim().to_string();
        if to.is_empty() {
            return Err(ActionError::MalformedInput(
                "recipient_email must not be empty".to_string(),
            ));
        }

        let receipt = self
            .sender
            .send_email(OutboundEmail {
                to,
                subject: params.subject.filter(|s| !s.trim().is_empty()),
                body: params.body,
            })
            .await?;
        info!(conversation_id = %input.conversation_id, id = %receipt.id, "Email sent");

        Ok(ActionOutput {
            action_type: self.action_type(),
            response: serde_json::json!({"success": true}),
        })
    }
}
