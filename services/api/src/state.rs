//! Shared Application State
//!
//! This module defines the state handed to the telephony handlers: the
//! process-wide services every route shares, plus the inbound-call
//! configuration of the particular route being served.

use crate::{config_manager::ConfigManager, events::EventsManager};
use receptionist_core::{
    agent::{AgentConfig, AgentFactory},
    twilio::TwilioConfig,
};
use std::sync::Arc;

/// Binds a URL path to an agent configuration and Twilio credentials.
#[derive(Clone, Debug)]
pub struct InboundCallConfig {
    pub url: String,
    pub agent_config: AgentConfig,
    pub twilio_config: TwilioConfig,
    /// Require a valid `X-Twilio-Signature`, keyed with `twilio_config.auth_token`.
    pub verify_signatures: bool,
}

/// Services created once at startup and shared by all routes.
#[derive(Clone)]
pub struct AppState {
    /// Public host (no scheme) Twilio reaches this server at.
    pub base_url: Arc<String>,
    pub config_manager: Arc<dyn ConfigManager>,
    pub agent_factory: Arc<dyn AgentFactory>,
    pub events_manager: Arc<EventsManager>,
}

/// State of one inbound-call route.
#[derive(Clone)]
pub struct InboundRouteState {
    pub app: Arc<AppState>,
    pub inbound: Arc<InboundCallConfig>,
}

impl InboundRouteState {
    /// Absolute URL Twilio posts gathered speech to for a conversation.
    pub fn speech_url(&self, conversation_id: &str) -> String {
        self.public_url(&format!(
            "{}/{}/speech",
            self.inbound.url.trim_end_matches('/'),
            conversation_id
        ))
    }

    /// The public URL Twilio used to reach `path_and_query` on this server.
    pub fn public_url(&self, path_and_query: &str) -> String {
        format!("https://{}{}", self.app.base_url, path_and_query)
    }
}
