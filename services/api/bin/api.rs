//! Main Entrypoint for the Receptionist Telephony Server
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and parsing the CLI.
//! 2. Resolving the public base URL, opening a tunnel if needed.
//! 3. Initializing shared services (LLM client, config and events managers,
//!    stale call sweeper).
//! 4. Constructing the telephony router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use clap::Parser;
use receptionist_api::{
    bootstrap::{build_telephony_server, resolve_base_url},
    cli::Cli,
    config::Config,
    config_manager::{ConfigManager, InMemoryConfigManager, spawn_stale_call_sweeper},
    events::EventsManager,
    router::create_router,
    tunnel::NgrokTunnel,
};
use receptionist_core::llm_client::{LLMClient, OpenAICompatibleClient};
use std::{sync::Arc, time::Duration};
use tracing::info;

const STALE_CALL_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Resolving public base URL...");

    // --- 3. Resolve Base URL ---
    let tunnel = NgrokTunnel::new(config.ngrok_auth_token.clone());
    let base_url = resolve_base_url(config.base_url.as_deref(), cli.port, &tunnel)
        .await
        .context("Failed to determine a public base URL")?;

    // --- 4. Initialize Shared Services ---
    let openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
    let llm_client: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(openai_config));
    let config_manager: Arc<dyn ConfigManager> = Arc::new(InMemoryConfigManager::default());
    let events_manager = Arc::new(EventsManager::default());
    let event_logger = events_manager.spawn_logger();
    let call_sweeper = spawn_stale_call_sweeper(
        config_manager.clone(),
        events_manager.clone(),
        config.call_max_age,
        STALE_CALL_SWEEP_INTERVAL,
    );

    let telephony_server = build_telephony_server(
        &config,
        base_url.host.clone(),
        llm_client,
        config_manager,
        events_manager,
    );

    // --- 5. Create Router ---
    let app = create_router(&telephony_server);

    // --- 6. Start Server ---
    info!(
        base_url = %base_url.host,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        tunneled = base_url.tunnel.is_some(),
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    drop(telephony_server);
    call_sweeper.abort();
    event_logger.abort();
    // Closes the tunnel, if one was opened.
    drop(base_url);
    info!("Server has shut down.");
    Ok(())
}
