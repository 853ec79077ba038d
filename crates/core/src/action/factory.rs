//! Action factories: tagged dispatch from [`ActionConfig`] to an action.

use super::{
    Action, ActionConfig, ActionError, ActionFactory, ScheduleAppointmentAction, SendEmailAction,
    TransferCallAction,
};
use crate::{nylas::EmailSender, twilio::TwilioClient};
use std::sync::Arc;

/// Builds only the appointment-notification action; every other
/// configuration is rejected.
pub struct ReceptionistActionFactory {
    appointment: Arc<ScheduleAppointmentAction>,
}

impl ReceptionistActionFactory {
    pub fn new(appointment: ScheduleAppointmentAction) -> Self {
        Self {
            appointment: Arc::new(appointment),
        }
    }

    /// Wires the appointment action to a Twilio client.
    pub fn from_twilio(client: Arc<TwilioClient>, from_number: impl Into<String>) -> Self {
        Self::new(ScheduleAppointmentAction::new(client, from_number))
    }
}

impl ActionFactory for ReceptionistActionFactory {
    fn create_action(&self, config: &ActionConfig) -> Result<Arc<dyn Action>, ActionError> {
        match config {
            ActionConfig::TwilioScheduleAppointment => Ok(self.appointment.clone()),
            other => Err(ActionError::InvalidActionType(other.action_type())),
        }
    }
}

/// Builds every action the receptionist supports: appointment SMS, call
/// transfer and, once an email sender is attached, email.
pub struct StandardActionFactory {
    client: Arc<TwilioClient>,
    appointment: Arc<ScheduleAppointmentAction>,
    email: Option<Arc<SendEmailAction>>,
}

impl StandardActionFactory {
    pub fn new(client: Arc<TwilioClient>, from_number: impl Into<String>) -> Self {
        let appointment = Arc::new(ScheduleAppointmentAction::new(client.clone(), from_number));
        Self {
            client,
            appointment,
            email: None,
        }
    }

    pub fn with_email_sender(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(Arc::new(SendEmailAction::new(sender)));
        self
    }
}

impl ActionFactory for StandardActionFactory {
    fn create_action(&self, config: &ActionConfig) -> Result<Arc<dyn Action>, ActionError> {
        match config {
            ActionConfig::TwilioScheduleAppointment => Ok(self.appointment.clone()),
            ActionConfig::TransferCall { to_phone } => Ok(Arc::new(TransferCallAction::new(
                self.client.clone(),
                to_phone.clone(),
            ))),
            ActionConfig::NylasSendEmail => match &self.email {
                Some(email) => Ok(email.clone()),
                None => Err(ActionError::InvalidActionType(config.action_type())),
            },
        }
    }
}
