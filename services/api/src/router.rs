//! Axum Router Configuration
//!
//! This module defines the telephony server, which turns a list of
//! inbound-call configurations into Twilio webhook routes, and the final
//! application router the binary serves.

use crate::{
    config_manager::ConfigManager,
    events::EventsManager,
    handlers,
    middleware::verify_twilio_signature,
    state::{AppState, InboundCallConfig, InboundRouteState},
};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use receptionist_core::agent::AgentFactory;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Serves one set of Twilio webhooks per inbound-call configuration.
pub struct TelephonyServer {
    state: Arc<AppState>,
    inbound_call_configs: Vec<InboundCallConfig>,
}

impl TelephonyServer {
    pub fn new(
        base_url: String,
        config_manager: Arc<dyn ConfigManager>,
        inbound_call_configs: Vec<InboundCallConfig>,
        agent_factory: Arc<dyn AgentFactory>,
        events_manager: Arc<EventsManager>,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                base_url: Arc::new(base_url),
                config_manager,
                agent_factory,
                events_manager,
            }),
            inbound_call_configs,
        }
    }

    /// Builds the webhook routes:
    ///
    /// - `POST {url}`: new inbound call
    /// - `POST {url}/{conversation_id}/speech`: gathered caller speech
    /// - `POST {url}/status`: call status callback
    ///
    /// Every route checks the Twilio request signature when the config asks for it.
    pub fn get_router(&self) -> Router {
        self.inbound_call_configs
            .iter()
            .fold(Router::new(), |router, inbound| {
                info!(
                    url = %inbound.url,
                    verify_signatures = inbound.verify_signatures,
                    "Registering inbound call route"
                );
                let route_state = InboundRouteState {
                    app: self.state.clone(),
                    inbound: Arc::new(inbound.clone()),
                };
                let url = inbound.url.trim_end_matches('/');
                router.merge(
                    Router::new()
                        .route(url, post(handlers::inbound_call))
                        .route(
                            &format!("{url}/{{conversation_id}}/speech"),
                            post(handlers::speech),
                        )
                        .route(&format!("{url}/status"), post(handlers::call_status))
                        .route_layer(middleware::from_fn_with_state(
                            route_state.clone(),
                            verify_twilio_signature,
                        ))
                        .with_state(route_state),
                )
            })
    }
}

/// Creates the main Axum router for the application.
pub fn create_router(telephony_server: &TelephonyServer) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(telephony_server.get_router())
        .layer(TraceLayer::new_for_http())
}
