//! Appointment confirmation by SMS.
//!
//! Once the caller confirms a doctor, date and time, the agent invokes this
//! action to text the details to the caller's preferred number.

use super::{Action, ActionError, ActionInput, ActionOutput, ActionType};
use crate::twilio::{OutboundSms, SmsSender};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const DESCRIPTION: &str = "Sends an SMS using Twilio API to the preferred contact number provided by the patient \
once the patient confirms the selected date and time for doctor's appointment with the doctor's name, date and time. \
The input may also be a pipe separated list of the recipient phone number, doctor's name, date and time, \
for example `+12134469407|Doctor Patel|August 27th 2023|2pm`. Always include every pipe character even if a field is blank.";

/// Structured parameters for the appointment SMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleAppointmentParameters {
    /// The contact number of the patient.
    pub recipient_number: String,
    /// Body of the SMS containing doctor's name, date and time of appointment with the doctor
    /// that was confirmed and chosen by patient.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAppointmentResponse {
    pub success: bool,
}

/// The two argument shapes the LLM is known to emit.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawParameters {
    Structured(ScheduleAppointmentParameters),
    Delimited(String),
}

impl ScheduleAppointmentParameters {
    /// Parses `number|doctor|date|time` into a recipient and a composed body.
    ///
    /// Exactly four fields are required; blank fields are allowed.
    pub fn from_delimited(input: &str) -> Result<Self, ActionError> {
        let fields: Vec<&str> = input.split('|').map(str::trim).collect();
        let [recipient, doctor, date, time] = fields.as_slice() else {
            return Err(ActionError::MalformedInput(format!(
                "expected 4 pipe-separated fields (number|doctor|date|time), got {}",
                fields.len()
            )));
        };
        Ok(Self {
            recipient_number: recipient.to_string(),
            body: format!("Your appointment is with {doctor} on {date} at {time}"),
        })
    }

    /// Accepts either the structured object or the delimited string.
    pub fn from_value(params: serde_json::Value) -> Result<Self, ActionError> {
        let raw: RawParameters = serde_json::from_value(params)
            .map_err(|e| ActionError::MalformedInput(e.to_string()))?;
        match raw {
            RawParameters::Structured(mut params) => {
                params.recipient_number = params.recipient_number.trim().to_string();
                Ok(params)
            }
            RawParameters::Delimited(input) => Self::from_delimited(&input),
        }
    }
}

/// Texts the confirmed appointment to the patient.
pub struct ScheduleAppointmentAction {
    sender: Arc<dyn SmsSender>,
    from_number: String,
}

impl ScheduleAppointmentAction {
    /// `from_number` is the Twilio number the SMS is sent from.
    pub fn new(sender: Arc<dyn SmsSender>, from_number: impl Into<String>) -> Self {
        Self {
            sender,
            from_number: from_number.into(),
        }
    }
}

#[async_trait]
impl Action for ScheduleAppointmentAction {
    fn action_type(&self) -> ActionType {
        ActionType::TwilioScheduleAppointment
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(ScheduleAppointmentParameters))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    async fn run(&self, input: ActionInput) -> Result<ActionOutput, ActionError> {
        let params = ScheduleAppointmentParameters::from_value(input.params)?;

        let receipt = self
            .sender
            .send_sms(OutboundSms {
                from: self.from_number.clone(),
                to: params.recipient_number,
                body: params.body,
            })
            .await?;
        info!(conversation_id = %input.conversation_id, sid = %receipt.sid, "Appointment SMS sent");

        Ok(ActionOutput {
            action_type: self.action_type(),
            response: serde_json::to_value(ScheduleAppointmentResponse { success: true })
                .map_err(|e| ActionError::MalformedInput(e.to_string()))?,
        })
    }
}
