use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use agora_db::Database;
use agora_types::api::Claims;
use agora_types::events::{DeliveryEvent, GatewayCommand, GatewayEvent};

use crate::channel::DeliveryChannel;

/// Heartbeat interval: server sends a Ping every 15 seconds.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh connection gets to present its Identify command.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection: Identify handshake, Ready,
/// then per-conversation subscription and event forwarding.
pub async fn handle_connection(
    socket: WebSocket,
    channel: DeliveryChannel,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let claims = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(claims) => claims,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };
    let user_id = claims.sub;

    info!("{} ({}) connected to gateway", claims.username, user_id);

    let ready = GatewayEvent::Ready { user_id };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, channel, db, user_id).await;

    info!("{} disconnected from gateway", user_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    channel: DeliveryChannel,
    db: Arc<Database>,
    user_id: Uuid,
) {
    // Events from all subscribed topics funnel into one per-connection queue.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<DeliveryEvent>();
    let mut forwarders: HashMap<Uuid, JoinHandle<()>> = HashMap::new();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }

            Some(event) = event_rx.recv() => {
                if send_event(&mut sender, &GatewayEvent::Delivery(event)).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let command = match serde_json::from_str::<GatewayCommand>(&text) {
                            Ok(command) => command,
                            Err(e) => {
                                warn!("Unparseable gateway command from {}: {}", user_id, e);
                                continue;
                            }
                        };
                        if let GatewayCommand::Subscribe { conversation_ids } = command {
                            subscribe_all(
                                &channel,
                                &db,
                                user_id,
                                conversation_ids,
                                &event_tx,
                                &mut forwarders,
                            )
                            .await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ping/Pong/Binary — nothing to do
                    Some(Err(_)) => break,
                }
            }
        }
    }

    for (_, handle) in forwarders {
        handle.abort();
    }
}

/// Subscribe the connection to each conversation it participates in; a
/// forwarder task per topic relays events into the connection queue.
async fn subscribe_all(
    channel: &DeliveryChannel,
    db: &Arc<Database>,
    user_id: Uuid,
    conversation_ids: Vec<Uuid>,
    event_tx: &mpsc::UnboundedSender<DeliveryEvent>,
    forwarders: &mut HashMap<Uuid, JoinHandle<()>>,
) {
    for conversation_id in conversation_ids {
        if forwarders.contains_key(&conversation_id) {
            continue;
        }

        // Membership check runs on the blocking pool
        let db = db.clone();
        let allowed = tokio::task::spawn_blocking(move || {
            db.is_participant(&conversation_id.to_string(), &user_id.to_string())
        })
        .await
        .unwrap_or(Ok(false))
        .unwrap_or(false);

        if !allowed {
            warn!(
                "{} tried to subscribe to conversation {} without membership",
                user_id, conversation_id
            );
            continue;
        }

        let mut rx = channel.subscribe(conversation_id).await;
        let tx = event_tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    // Missed events: at-least-once delivery — the client
                    // re-syncs from the persisted order.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        forwarders.insert(conversation_id, handle);
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap();
    sender.send(Message::Text(text.into())).await
}

/// Wait for the Identify command carrying a JWT and validate it.
async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Claims> {
    let identify = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return Some(token);
                }
            }
        }
        None
    })
    .await
    .ok()??;

    decode::<Claims>(
        &identify,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}
