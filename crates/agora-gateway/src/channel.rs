use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use agora_types::events::DeliveryEvent;

/// Per-topic buffer depth. A subscriber that lags past this many events
/// observes a `Lagged` gap and re-syncs from the persisted order.
const TOPIC_CAPACITY: usize = 256;

/// Topic-based publish/subscribe fan-out, one topic per conversation.
///
/// Publishing is fire-and-forget after a successful persist: delivery is
/// at-least-once and subscribers are responsible for idempotence on the
/// row id and for re-sorting by the persisted (created_at, id) order.
#[derive(Clone, Default)]
pub struct DeliveryChannel {
    topics: Arc<RwLock<HashMap<Uuid, broadcast::Sender<DeliveryEvent>>>>,
}

impl DeliveryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one conversation's topic, creating it on first use.
    pub async fn subscribe(&self, conversation_id: Uuid) -> broadcast::Receiver<DeliveryEvent> {
        let mut topics = self.topics.write().await;
        topics
            .entry(conversation_id)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event to its conversation topic. Dropped silently when
    /// nobody is subscribed; the persisted row remains the source of truth.
    pub async fn publish(&self, event: DeliveryEvent) {
        let conversation_id = event.conversation_id;
        let gone = {
            let topics = self.topics.read().await;
            match topics.get(&conversation_id) {
                Some(tx) => tx.send(event).is_err(),
                None => false,
            }
        };

        // Last subscriber went away: drop the topic so idle conversations
        // don't accumulate senders.
        if gone {
            let mut topics = self.topics.write().await;
            if let Some(tx) = topics.get(&conversation_id) {
                if tx.receiver_count() == 0 {
                    topics.remove(&conversation_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::events::RowOp;

    fn event(conversation_id: Uuid, id: &str) -> DeliveryEvent {
        DeliveryEvent::insert(conversation_id, "messages", serde_json::json!({ "id": id }))
    }

    #[tokio::test]
    async fn subscribers_receive_topic_events() {
        let channel = DeliveryChannel::new();
        let conversation = Uuid::new_v4();

        let mut rx = channel.subscribe(conversation).await;
        channel.publish(event(conversation, "m1")).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.op, RowOp::Insert);
        assert_eq!(received.conversation_id, conversation);
        assert_eq!(received.row["id"], "m1");
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let channel = DeliveryChannel::new();
        let conversation_a = Uuid::new_v4();
        let conversation_b = Uuid::new_v4();

        let mut rx_a = channel.subscribe(conversation_a).await;
        let mut rx_b = channel.subscribe(conversation_b).await;

        channel.publish(event(conversation_b, "m1")).await;

        assert_eq!(rx_b.recv().await.unwrap().row["id"], "m1");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fire_and_forget() {
        let channel = DeliveryChannel::new();
        // Must not error or block
        channel.publish(event(Uuid::new_v4(), "m1")).await;
    }
}
