//! Call lifecycle events.
//!
//! The telephony handlers publish [`CallEvent`]s to a single process-wide
//! [`EventsManager`]. Any number of subscribers can observe them; the binary
//! runs one that writes every event to the log.

use receptionist_core::action::ActionType;
use serde::Serialize;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    CallStarted {
        conversation_id: String,
        call_sid: String,
        from_phone: Option<String>,
        to_phone: Option<String>,
    },
    HumanTurn {
        conversation_id: String,
        text: String,
    },
    BotTurn {
        conversation_id: String,
        text: String,
    },
    ActionCompleted {
        conversation_id: String,
        action_type: ActionType,
        response: serde_json::Value,
    },
    CallEnded {
        conversation_id: String,
        reason: String,
    },
}

pub struct EventsManager {
    tx: broadcast::Sender<CallEvent>,
}

impl Default for EventsManager {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventsManager {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: CallEvent) {
        if self.tx.send(event).is_err() {
            debug!("Call event dropped: no subscribers.");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.tx.subscribe()
    }

    /// Spawns a task that logs every published event.
    pub fn spawn_logger(&self) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => info!(event = %json, "Call event"),
                        Err(e) => warn!(error = %e, "Failed to serialize call event"),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event logger fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
