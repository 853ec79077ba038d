//! Hands the live call over to a human by dialing a configured number.

use super::{Action, ActionError, ActionInput, ActionOutput, ActionType};
use crate::{twilio::CallController, twiml::TwimlResponse};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub struct TransferCallAction {
    controller: Arc<dyn CallController>,
    to_phone: String,
}

impl TransferCallAction {
    pub fn new(controller: Arc<dyn CallController>, to_phone: impl Into<String>) -> Self {
        Self {
            controller,
            to_phone: to_phone.into(),
        }
    }
}

#[async_trait]
impl Action for TransferCallAction {
    fn action_type(&self) -> ActionType {
        ActionType::TransferCall
    }

    fn description(&self) -> &str {
        "Transfers the current call to a human receptionist. Use it only when the caller explicitly asks to speak to a person."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, input: ActionInput) -> Result<ActionOutput, ActionError> {
        let call_sid = input.call_sid.as_deref().ok_or(ActionError::NoActiveCall)?;

        let twiml = TwimlResponse::new().dial(&self.to_phone).to_xml();
        self.controller.redirect_call(call_sid, &twiml).await?;
        info!(conversation_id = %input.conversation_id, %call_sid, to = %self.to_phone, "Call transferred");

        Ok(ActionOutput {
            action_type: self.action_type(),
            response: json!({"success": true}),
        })
    }
}
