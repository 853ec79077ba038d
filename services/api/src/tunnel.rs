//! Public tunnel to the local server.
//!
//! Twilio must reach our webhooks over the public internet. During
//! development we expose the local port through an ngrok tunnel: the
//! `ngrok` agent is spawned as a child process and its local inspection API
//! is polled until the public https URL appears.

use async_trait::async_trait;
use serde::Deserialize;
use std::{process::Stdio, time::Duration};
use tokio::process::{Child, Command};
use tracing::{debug, info};

pub const NGROK_AGENT_API: &str = "http://127.0.0.1:4040/api/tunnels";

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("Failed to start tunnel agent: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Tunnel agent exited before a tunnel was established")]
    Exited,
    #[error("No tunnel became available within {0:?}")]
    Timeout(Duration),
}

/// An open tunnel. Dropping it closes the tunnel.
#[derive(Debug)]
pub struct TunnelHandle {
    pub public_url: String,
    _agent: Option<Child>,
}

impl TunnelHandle {
    /// A handle that owns no process, for tunnels managed elsewhere.
    pub fn detached(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
            _agent: None,
        }
    }
}

/// Opens a public tunnel to a local port.
#[async_trait]
pub trait TunnelOpener: Send + Sync {
    async fn open(&self, port: u16) -> Result<TunnelHandle, TunnelError>;
}

#[derive(Debug, Deserialize)]
struct TunnelList {
    tunnels: Vec<TunnelInfo>,
}

#[derive(Debug, Deserialize)]
struct TunnelInfo {
    public_url: String,
    proto: String,
}

/// Picks the https tunnel from the agent's tunnel list.
fn https_public_url(body: &str) -> Option<String> {
    let list: TunnelList = serde_json::from_str(body).ok()?;
    list.tunnels
        .into_iter()
        .find(|t| t.proto == "https")
        .map(|t| t.public_url)
}

/// Spawns the `ngrok` agent binary.
pub struct NgrokTunnel {
    binary: String,
    auth_token: Option<String>,
    api_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl NgrokTunnel {
    pub fn new(auth_token: Option<String>) -> Self {
        Self {
            binary: "ngrok".to_string(),
            auth_token,
            api_url: NGROK_AGENT_API.to_string(),
            timeout: Duration::from_secs(15),
            http: reqwest::Client::new(),
        }
    }

    async fn poll_public_url(&self) -> Option<String> {
        let response = self.http.get(&self.api_url).send().await.ok()?;
        let body = response.text().await.ok()?;
        https_public_url(&body)
    }
}

#[async_trait]
impl TunnelOpener for NgrokTunnel {
    async fn open(&self, port: u16) -> Result<TunnelHandle, TunnelError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("http")
            .arg(port.to_string())
            .args(["--log", "stdout"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(token) = &self.auth_token {
            command.arg("--authtoken").arg(token);
        }

        let mut agent = command.spawn()?;
        debug!(port, "ngrok agent started, waiting for tunnel");

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            if let Some(public_url) = self.poll_public_url().await {
                info!(%public_url, port, "ngrok tunnel established");
                return Ok(TunnelHandle {
                    public_url,
                    _agent: Some(agent),
                });
            }
            if agent.try_wait()?.is_some() {
                return Err(TunnelError::Exited);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TunnelError::Timeout(self.timeout));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}
