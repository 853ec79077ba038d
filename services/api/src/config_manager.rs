//! Per-call state storage.
//!
//! Each webhook Twilio sends for a call is an independent HTTP request, so
//! everything needed to continue the conversation lives in a [`CallConfig`]
//! kept here between requests.

use crate::{
    events::{CallEvent, EventsManager},
    models::CallConfig,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{info, warn};

/// Reason reported in `CallEnded` for calls removed by the sweeper.
pub const EXPIRED_REASON: &str = "expired";

#[async_trait]
pub trait ConfigManager: Send + Sync {
    async fn save_config(&self, conversation_id: &str, config: CallConfig) -> Result<()>;

    /// Replaces an existing config. Returns `false`, writing nothing, when the
    /// conversation is no longer stored.
    async fn update_config(&self, conversation_id: &str, config: CallConfig) -> Result<bool>;

    async fn get_config(&self, conversation_id: &str) -> Result<Option<CallConfig>>;

    /// Removes and returns the config, if present.
    async fn delete_config(&self, conversation_id: &str) -> Result<Option<CallConfig>>;

    /// Finds the conversation bound to a Twilio call SID.
    async fn find_by_call_sid(&self, call_sid: &str) -> Result<Option<CallConfig>>;

    /// Removes and returns every config created before `cutoff`.
    async fn remove_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<CallConfig>>;
}

/// A process-local config manager.
#[derive(Default)]
pub struct InMemoryConfigManager {
    configs: RwLock<HashMap<String, CallConfig>>,
}

#[async_trait]
impl ConfigManager for InMemoryConfigManager {
    async fn save_config(&self, conversation_id: &str, config: CallConfig) -> Result<()> {
        self.configs
            .write()
            .await
            .insert(conversation_id.to_string(), config);
        Ok(())
    }

    async fn update_config(&self, conversation_id: &str, config: CallConfig) -> Result<bool> {
        match self.configs.write().await.get_mut(conversation_id) {
            Some(stored) => {
                *stored = config;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_config(&self, conversation_id: &str) -> Result<Option<CallConfig>> {
        Ok(self.configs.read().await.get(conversation_id).cloned())
    }

    async fn delete_config(&self, conversation_id: &str) -> Result<Option<CallConfig>> {
        Ok(self.configs.write().await.remove(conversation_id))
    }

    async fn find_by_call_sid(&self, call_sid: &str) -> Result<Option<CallConfig>> {
        Ok(self
            .configs
            .read()
            .await
            .values()
            .find(|config| config.call_sid == call_sid)
            .cloned())
    }

    async fn remove_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<CallConfig>> {
        let mut configs = self.configs.write().await;
        let stale: Vec<String> = configs
            .iter()
            .filter(|(_, config)| config.created_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        Ok(stale
            .iter()
            .filter_map(|id| configs.remove(id))
            .collect())
    }
}

/// Spawns a task that, every `every`, removes calls older than `max_age` and
/// reports each as ended.
///
/// Covers callers who hang up while no status callback is configured on the
/// Twilio number, which would otherwise stay stored forever.
pub fn spawn_stale_call_sweeper(
    config_manager: Arc<dyn ConfigManager>,
    events_manager: Arc<EventsManager>,
    max_age: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Ok(max_age) = TimeDelta::from_std(max_age) else {
            warn!(?max_age, "Call max age out of range; stale call sweeper disabled");
            return;
        };
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
                continue;
            };
            match config_manager.remove_created_before(cutoff).await {
                Ok(expired) => {
                    for config in expired {
                        info!(conversation_id = %config.conversation_id, "Expired stale call");
                        events_manager.publish(CallEvent::CallEnded {
                            conversation_id: config.conversation_id,
                            reason: EXPIRED_REASON.to_string(),
                        });
                    }
                }
                Err(e) => warn!(error = ?e, "Stale call sweep failed"),
            }
        }
    })
}
