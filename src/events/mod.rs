use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::models::OrderStatus;
use crate::store::Collection;

/// Change notifications published after a successful write, on either the
/// remote or the local path. Advisory only: a subscriber that lags or is not
/// listening simply re-reads later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: String,
        order_number: String,
    },
    OrderUpdated(String),
    OrderDeleted(String),
    OrderStatusChanged {
        order_id: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
        operator: Option<String>,
        at: DateTime<Utc>,
    },
    FragmentsAllocated {
        order_id: String,
        fragment_count: usize,
    },
    FragmentUpdated {
        order_id: String,
        fragment_number: u32,
    },

    /// Any other collection changed.
    RecordChanged {
        collection: Collection,
        id: String,
    },
    RecordDeleted {
        collection: Collection,
        id: String,
    },

    SettingsChanged(String),
    BackupRestored,
}

impl Event {
    /// Id of the order the event concerns, if any.
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Event::OrderCreated { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. }
            | Event::FragmentsAllocated { order_id, .. }
            | Event::FragmentUpdated { order_id, .. } => Some(order_id),
            Event::OrderUpdated(id) | Event::OrderDeleted(id) => Some(id),
            _ => None,
        }
    }
}

/// In-process publish/subscribe channel for [`Event`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishes an event, returning how many subscribers received it.
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: Event) -> usize {
        match self.sender.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "no subscribers for event");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Handler that writes every event to the log.
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle_event(&self, event: Event) -> Result<(), String> {
        info!(?event, "event");
        Ok(())
    }
}

/// Drives a subscriber until the bus is dropped.
pub async fn process_events(mut rx: broadcast::Receiver<Event>, handler: Arc<dyn EventHandler>) {
    debug!("Starting event processing loop");

    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(e) = handler.handle_event(event.clone()).await {
                    error!(?event, error = %e, "event handler failed");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    debug!("Event processing loop stopped");
}
