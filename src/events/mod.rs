use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
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

// Events emitted by the transfer engine. The processing loop is the boundary
// to the external notification collaborator; delivery outcome never affects
// the committed transaction that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PurchaseRequestSubmitted {
        request_id: Uuid,
        client_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    PurchaseRequestApproved {
        request_id: Uuid,
        client_id: Uuid,
        product_name: String,
        quantity: i32,
        order_id: Uuid,
    },
    PurchaseRequestRejected {
        request_id: Uuid,
        client_id: Uuid,
        product_name: String,
        quantity: i32,
        reason: String,
    },
    InventoryTransferred {
        source_product_id: Uuid,
        client_id: Uuid,
        quantity: i32,
        manufacturer_stock_after: i32,
        client_stock_after: i32,
    },
    ClientInventoryLowStock {
        client_id: Uuid,
        source_product_id: Uuid,
        current_stock: i32,
        reorder_level: i32,
    },
    OrderCreated(Uuid),
}

/// Notification payload handed to the external notification collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub request_id: Uuid,
    pub client_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Maps approval/rejection events to the outbound notification shape.
    /// Other events are internal and produce no notification.
    pub fn to_notification(&self) -> Option<NotificationEvent> {
        match self {
            Event::PurchaseRequestApproved {
                request_id,
                client_id,
                product_name,
                quantity,
                ..
            } => Some(NotificationEvent {
                kind: "purchase_request_approved".to_string(),
                request_id: *request_id,
                client_id: *client_id,
                product_name: product_name.clone(),
                quantity: *quantity,
                reason: None,
                timestamp: Utc::now(),
            }),
            Event::PurchaseRequestRejected {
                request_id,
                client_id,
                product_name,
                quantity,
                reason,
            } => Some(NotificationEvent {
                kind: "purchase_request_rejected".to_string(),
                request_id: *request_id,
                client_id: *client_id,
                product_name: product_name.clone(),
                quantity: *quantity,
                reason: Some(reason.clone()),
                timestamp: Utc::now(),
            }),
            _ => None,
        }
    }
}

// Processes incoming events and hands notifications to the external
// collaborator. Failures here are logged; the collaborator owns retries.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PurchaseRequestApproved {
                request_id,
                order_id,
                ..
            } => {
                info!(request_id = %request_id, order_id = %order_id, "Processing approval event");
            }
            Event::PurchaseRequestRejected {
                request_id, reason, ..
            } => {
                info!(request_id = %request_id, reason = %reason, "Processing rejection event");
            }
            Event::InventoryTransferred {
                source_product_id,
                client_id,
                quantity,
                manufacturer_stock_after,
                client_stock_after,
            } => {
                info!(
                    source_product_id = %source_product_id,
                    client_id = %client_id,
                    quantity = quantity,
                    manufacturer_stock_after = manufacturer_stock_after,
                    client_stock_after = client_stock_after,
                    "Inventory transferred"
                );
            }
            Event::ClientInventoryLowStock {
                client_id,
                source_product_id,
                current_stock,
                reorder_level,
            } => {
                warn!(
                    client_id = %client_id,
                    source_product_id = %source_product_id,
                    current_stock = current_stock,
                    reorder_level = reorder_level,
                    "Client ledger at or below reorder level"
                );
            }
            Event::PurchaseRequestSubmitted { request_id, .. } => {
                info!(request_id = %request_id, "Purchase request submitted");
            }
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Order created");
            }
        }

        if let Some(notification) = event.to_notification() {
            if let Err(e) = dispatch_notification(&notification).await {
                // Delivery is owned by the notification collaborator; log and move on.
                warn!(
                    kind = %notification.kind,
                    request_id = %notification.request_id,
                    error = %e,
                    "Notification dispatch failed"
                );
            }
        }
    }

    warn!("Event processing loop has ended");
}

async fn dispatch_notification(notification: &NotificationEvent) -> Result<(), String> {
    // The notification collaborator (email/WhatsApp/push) consumes the
    // serialized payload out-of-process; here we emit it on the log boundary.
    let payload =
        serde_json::to_string(notification).map_err(|e| format!("serialize: {}", e))?;
    info!(payload = %payload, "Notification event emitted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approved_event_maps_to_notification_payload() {
        let request_id = Uuid::new_v4();
        let client_id = Uuid::new_v4();
        let event = Event::PurchaseRequestApproved {
            request_id,
            client_id,
            product_name: "Widget".into(),
            quantity: 4,
            order_id: Uuid::new_v4(),
        };

        let notification = event.to_notification().expect("notification expected");
        assert_eq!(notification.kind, "purchase_request_approved");
        assert_eq!(notification.request_id, request_id);
        assert_eq!(notification.quantity, 4);
        assert!(notification.reason.is_none());
    }

    #[test]
    fn rejected_event_carries_reason() {
        let event = Event::PurchaseRequestRejected {
            request_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            product_name: "Widget".into(),
            quantity: 2,
            reason: "out of season".into(),
        };

        let notification = event.to_notification().expect("notification expected");
        assert_eq!(notification.kind, "purchase_request_rejected");
        assert_eq!(notification.reason.as_deref(), Some("out of season"));
    }

    #[test]
    fn internal_events_produce_no_notification() {
        let event = Event::OrderCreated(Uuid::new_v4());
        assert!(event.to_notification().is_none());

        let event = Event::InventoryTransferred {
            source_product_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            quantity: 1,
            manufacturer_stock_after: 9,
            client_stock_after: 1,
        };
        assert!(event.to_notification().is_none());
    }

    #[test]
    fn notification_serializes_with_type_tag() {
        let event = Event::PurchaseRequestApproved {
            request_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            product_name: "Widget".into(),
            quantity: 1,
            order_id: Uuid::new_v4(),
        };
        let json =
            serde_json::to_value(event.to_notification().unwrap()).expect("serializable");
        assert_eq!(json["type"], "purchase_request_approved");
        assert!(json.get("reason").is_none());
    }
}
