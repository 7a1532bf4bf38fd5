use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Handle used by services to publish domain events without blocking the
/// request path. Delivery is best effort: a failed send is logged by the
/// caller, never surfaced as an operation failure.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain events emitted by the core services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Stock ledger events
    StockAdded {
        product_id: Uuid,
        branch_id: Uuid,
        quantity: i32,
        new_quantity: i32,
        reference_number: String,
    },
    StockReduced {
        product_id: Uuid,
        branch_id: Uuid,
        quantity: i32,
        new_quantity: i32,
        reference_number: String,
    },
    StockTransferred {
        product_id: Uuid,
        from_branch_id: Uuid,
        to_branch_id: Uuid,
        quantity: i32,
        reference_number: String,
    },
    StockAdjusted {
        product_id: Uuid,
        branch_id: Uuid,
        previous_quantity: i32,
        new_quantity: i32,
        reference_number: String,
    },
    LowStockDetected {
        product_id: Uuid,
        branch_id: Uuid,
        quantity: i32,
        minimum_stock: i32,
    },

    // Sales transaction events
    TransactionCreated {
        transaction_id: Uuid,
        transaction_number: String,
        total: rust_decimal::Decimal,
    },
    TransactionApproved {
        transaction_id: Uuid,
        approved_by: Uuid,
        approved_at: DateTime<Utc>,
    },
    TransactionCancelled {
        transaction_id: Uuid,
        reason: Option<String>,
    },

    // Visit events
    VisitCreated {
        visit_id: Uuid,
        visit_number: String,
    },
    VisitApproved {
        visit_id: Uuid,
        approved_by: Uuid,
    },
    VisitRejected {
        visit_id: Uuid,
        rejected_by: Uuid,
        reason: String,
    },
}

/// Consumes events from the channel until all senders drop.
///
/// The core only logs here; downstream projections (notification fan-out,
/// report caches) subscribe in the embedding layer.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStockDetected {
                product_id,
                branch_id,
                quantity,
                minimum_stock,
            } => {
                warn!(
                    product_id = %product_id,
                    branch_id = %branch_id,
                    quantity = quantity,
                    minimum_stock = minimum_stock,
                    "Low stock detected"
                );
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::VisitCreated {
                visit_id: Uuid::new_v4(),
                visit_number: "VST-20240101-0001".to_string(),
            })
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Event::VisitCreated { .. }));
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender
            .send(Event::TransactionCancelled {
                transaction_id: Uuid::new_v4(),
                reason: None,
            })
            .await;
        assert!(result.is_err());
    }
}
