use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Builds a connected sender/receiver pair with the given channel capacity.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

// Define the various events that can occur in the inventory core.
// Events are emitted after the owning transaction commits; a lost event can
// never leave the stock record and the ledger out of step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ProductAssigned {
        product_id: Uuid,
        location_id: Uuid,
        reactivated: bool,
    },
    ProductUnassigned {
        product_id: Uuid,
        location_id: Uuid,
    },
    StockMovementRecorded {
        movement_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
        movement_type: String,
        quantity_change: i32,
        quantity_before: i32,
        quantity_after: i32,
        actor_user_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    LowStockWarning {
        product_id: Uuid,
        location_id: Uuid,
        remaining: i32,
        threshold: i32,
    },
    StockImportCompleted {
        location_id: Uuid,
        rows_processed: usize,
        assignments_created: usize,
        stock_updated: usize,
    },
}

/// Drains the event channel, logging each event. Listeners with real side
/// effects (notifications, sync to reporting) subscribe here in the outer
/// application.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStockWarning {
                product_id,
                location_id,
                remaining,
                threshold,
            } => {
                info!(
                    %product_id,
                    %location_id,
                    remaining,
                    threshold,
                    "Low stock warning"
                );
            }
            other => debug!(event = ?other, "Processing event"),
        }
    }
}
