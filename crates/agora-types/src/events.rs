use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row operation carried by a delivery event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowOp {
    Insert,
    Update,
}

/// Event published to the realtime delivery channel after a successful
/// persist, scoped to one conversation's topic. Delivery is at-least-once;
/// subscribers must be idempotent on the row id and re-sort by
/// (created_at, id) rather than trusting arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub op: RowOp,
    pub table: String,
    pub conversation_id: Uuid,
    pub row: serde_json::Value,
}

impl DeliveryEvent {
    pub fn insert(conversation_id: Uuid, table: &str, row: serde_json::Value) -> Self {
        Self {
            op: RowOp::Insert,
            table: table.to_string(),
            conversation_id,
            row,
        }
    }

    pub fn update(conversation_id: Uuid, table: &str, row: serde_json::Value) -> Self {
        Self {
            op: RowOp::Update,
            table: table.to_string(),
            conversation_id,
            row,
        }
    }
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// A persisted row changed in one of the caller's conversations
    Delivery(DeliveryEvent),
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to delivery events for specific conversations.
    /// The server only forwards events for conversations the caller
    /// participates in.
    Subscribe { conversation_ids: Vec<Uuid> },
}
