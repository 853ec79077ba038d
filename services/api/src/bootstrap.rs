//! One-time server initialization.
//!
//! Resolves the public base URL, assembles the receptionist agent
//! configuration and its action factory, and builds the telephony server
//! with its single `/inbound_call` route.

use crate::{
    config::Config,
    config_manager::ConfigManager,
    events::EventsManager,
    router::TelephonyServer,
    state::InboundCallConfig,
    tunnel::{TunnelError, TunnelHandle, TunnelOpener},
};
use receptionist_core::{
    action::{ActionConfig, ActionFactory, ReceptionistActionFactory, StandardActionFactory},
    agent::{AgentConfig, ChatAgentFactory},
    llm_client::LLMClient,
    nylas::NylasClient,
    prompt::{INITIAL_MESSAGE, PROMPT_PREAMBLE},
    twilio::TwilioClient,
};
use std::sync::Arc;
use tracing::info;

/// Tunnel port used when none is given on the command line.
pub const DEFAULT_TUNNEL_PORT: u16 = 3000;

pub const INBOUND_CALL_URL: &str = "/inbound_call";

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("BASE_URL must be set in environment if not using a tunnel")]
    MissingBaseUrl,
    #[error(transparent)]
    Tunnel(#[from] TunnelError),
}

/// The public host of this server, plus the tunnel keeping it reachable.
#[derive(Debug)]
pub struct ResolvedBaseUrl {
    /// Host name without scheme, e.g. `abc123.ngrok.io`.
    pub host: String,
    pub tunnel: Option<TunnelHandle>,
}

/// Uses `explicit` verbatim when set; otherwise opens a tunnel on `port`
/// (default 3000) and uses its host.
pub async fn resolve_base_url(
    explicit: Option<&str>,
    port: Option<u16>,
    tunnel: &dyn TunnelOpener,
) -> Result<ResolvedBaseUrl, BootstrapError> {
    if let Some(host) = explicit.filter(|h| !h.is_empty()) {
        return Ok(ResolvedBaseUrl {
            host: host.to_string(),
            tunnel: None,
        });
    }

    let port = port.unwrap_or(DEFAULT_TUNNEL_PORT);
    let handle = tunnel.open(port).await?;
    let host = handle
        .public_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string();
    if host.is_empty() {
        return Err(BootstrapError::MissingBaseUrl);
    }

    info!(%host, port, "tunnel \"{}\" -> \"http://127.0.0.1:{}\"", host, port);
    Ok(ResolvedBaseUrl {
        host,
        tunnel: Some(handle),
    })
}

/// The receptionist's chat agent configuration.
pub fn receptionist_agent_config(
    chat_model: &str,
    transfer_phone: Option<&str>,
    send_email: bool,
) -> AgentConfig {
    let mut agent_config = AgentConfig::new(PROMPT_PREAMBLE);
    agent_config.initial_message = Some(INITIAL_MESSAGE.to_string());
    agent_config.model_name = chat_model.to_string();
    agent_config.end_conversation_on_goodbye = true;
    agent_config.actions = vec![ActionConfig::TwilioScheduleAppointment];
    if let Some(to_phone) = transfer_phone {
        agent_config.actions.push(ActionConfig::TransferCall {
            to_phone: to_phone.to_string(),
        });
    }
    if send_email {
        agent_config.actions.push(ActionConfig::NylasSendEmail);
    }
    agent_config
}

/// Appointment SMS only, unless call transfer or email is configured.
pub fn build_action_factory(config: &Config, twilio: Arc<TwilioClient>) -> Arc<dyn ActionFactory> {
    let from = config.outbound_caller_number.clone();
    if config.transfer_phone_number.is_none() && config.nylas_access_token.is_none() {
        return Arc::new(ReceptionistActionFactory::from_twilio(twilio, from));
    }

    let factory = StandardActionFactory::new(twilio, from);
    match &config.nylas_access_token {
        Some(token) => Arc::new(factory.with_email_sender(Arc::new(NylasClient::new(token.clone())))),
        None => Arc::new(factory),
    }
}

/// Assembles the telephony server with the single inbound call route.
pub fn build_telephony_server(
    config: &Config,
    base_url: String,
    llm_client: Arc<dyn LLMClient>,
    config_manager: Arc<dyn ConfigManager>,
    events_manager: Arc<EventsManager>,
) -> TelephonyServer {
    let twilio = Arc::new(TwilioClient::new(config.twilio.clone()));
    let agent_factory = Arc::new(ChatAgentFactory::new(
        llm_client,
        build_action_factory(config, twilio),
    ));

    TelephonyServer::new(
        base_url,
        config_manager,
        vec![InboundCallConfig {
            url: INBOUND_CALL_URL.to_string(),
            agent_config: receptionist_agent_config(
                &config.chat_model,
                config.transfer_phone_number.as_deref(),
                config.nylas_access_token.is_some(),
            ),
            twilio_config: config.twilio.clone(),
            verify_signatures: config.verify_twilio_signatures,
        }],
        agent_factory,
        events_manager,
    )
}
