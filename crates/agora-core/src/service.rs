use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use agora_crypto::{EncryptionEngine, KeyStoreError, UNDECRYPTABLE_PLACEHOLDER};
use agora_crypto::keys::KeyStore;
use agora_db::Database;
use agora_db::models::{MessageRow, ReactionChange};
use agora_gateway::DeliveryChannel;
use agora_types::events::DeliveryEvent;
use agora_types::models::{ConversationKind, EncryptedMessage, EncryptionScheme};
use agora_types::time;

use crate::convert;
use crate::error::{CoreError, CoreResult};
use crate::registry::ConversationRegistry;

/// Restartable position in a conversation's total (created_at, id) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl MessageCursor {
    pub fn encode(&self) -> String {
        format!("{}|{}", time::to_storage(self.created_at), self.id)
    }

    pub fn decode(value: &str) -> Option<Self> {
        let (ts, id) = value.split_once('|')?;
        Some(Self {
            created_at: time::from_storage(ts).ok()?,
            id: id.parse().ok()?,
        })
    }
}

#[derive(Debug)]
pub struct MessagePage {
    pub messages: Vec<EncryptedMessage>,
    pub next_cursor: Option<MessageCursor>,
}

/// Orchestrates send/fetch/react/delete over the injected crypto seams
/// and publishes delivery events after successful persists.
///
/// Persistence failures are not retried here — the caller's transport
/// wrapper owns retries, which keeps duplicate sends impossible at this
/// layer.
#[derive(Clone)]
pub struct MessagingService {
    db: Arc<Database>,
    engine: Arc<dyn EncryptionEngine>,
    keys: Arc<dyn KeyStore>,
    channel: DeliveryChannel,
    registry: ConversationRegistry,
}

impl MessagingService {
    pub fn new(
        db: Arc<Database>,
        engine: Arc<dyn EncryptionEngine>,
        keys: Arc<dyn KeyStore>,
        channel: DeliveryChannel,
    ) -> Self {
        let registry = ConversationRegistry::new(db.clone());
        Self {
            db,
            engine,
            keys,
            channel,
            registry,
        }
    }

    /// Encrypt, persist and announce one message. The scheme follows the
    /// conversation type; cipher work runs off the I/O threads.
    pub async fn send(
        &self,
        conversation_id: Uuid,
        sender: Uuid,
        body: String,
    ) -> CoreResult<EncryptedMessage> {
        let this = self.clone();
        let message = tokio::task::spawn_blocking(move || {
            this.send_blocking(conversation_id, sender, body.as_bytes())
        })
        .await
        .map_err(|e| CoreError::Database(anyhow!("blocking task failed: {}", e)))??;

        // Fire-and-forget fan-out; the persisted row is the source of truth.
        self.channel
            .publish(DeliveryEvent::insert(
                conversation_id,
                "messages",
                message_row_json(&message),
            ))
            .await;

        Ok(message)
    }

    fn send_blocking(
        &self,
        conversation_id: Uuid,
        sender: Uuid,
        plaintext: &[u8],
    ) -> CoreResult<EncryptedMessage> {
        if plaintext.is_empty() {
            return Err(CoreError::BadRequest("message body cannot be empty".into()));
        }

        let conversation = self.registry.conversation(conversation_id)?;
        let participants = self.registry.participants_of(conversation_id)?;
        if !participants.iter().any(|p| p.user_id == sender) {
            return Err(CoreError::NotAParticipant);
        }

        let (scheme, ciphertext, nonce, wrapped_keys) = match conversation.kind {
            ConversationKind::Direct => {
                let peer = participants
                    .iter()
                    .map(|p| p.user_id)
                    .find(|id| *id != sender)
                    .ok_or_else(|| {
                        CoreError::Database(anyhow!("direct conversation missing a peer"))
                    })?;
                // Fails with KeyNotFound when the recipient never keyed.
                let recipient_key = self.keys.public_key(peer)?;
                let ciphertext = self.engine.encrypt_direct(plaintext, &recipient_key)?;
                (EncryptionScheme::Direct, ciphertext, Vec::new(), HashMap::new())
            }
            ConversationKind::Group | ConversationKind::Channel => {
                let sealed = self.engine.encrypt_group(plaintext)?;
                let mut wrapped_keys = HashMap::new();
                for participant in &participants {
                    match self.keys.public_key(participant.user_id) {
                        Ok(public_key) => {
                            let wrapped = self.engine.wrap_key(&sealed.key, &public_key)?;
                            wrapped_keys.insert(participant.user_id, B64.encode(wrapped));
                        }
                        // Unkeyed participants get no copy; they can read
                        // messages sent after they generate a pair.
                        Err(KeyStoreError::KeyNotFound(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                (
                    EncryptionScheme::Group,
                    sealed.ciphertext,
                    sealed.nonce.to_vec(),
                    wrapped_keys,
                )
            }
        };

        let message = EncryptedMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: sender,
            scheme,
            ciphertext,
            nonce,
            wrapped_keys,
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
        };

        let wrapped_json = serde_json::to_string(&message.wrapped_keys)
            .map_err(|e| CoreError::Database(anyhow!("serialize wrapped keys: {}", e)))?;
        self.db.insert_message(&MessageRow {
            id: message.id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender.to_string(),
            scheme: message.scheme.as_str().to_string(),
            ciphertext: message.ciphertext.clone(),
            nonce: message.nonce.clone(),
            wrapped_keys: wrapped_json,
            created_at: time::to_storage(message.created_at),
            edited_at: None,
            deleted_at: None,
        })?;

        Ok(message)
    }

    /// One page of the conversation's messages in total (created_at, id)
    /// order. Restartable: the cursor can be replayed or abandoned at any
    /// time without server-side state.
    pub async fn fetch(
        &self,
        conversation_id: Uuid,
        caller: Uuid,
        cursor: Option<MessageCursor>,
        limit: u32,
    ) -> CoreResult<MessagePage> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            this.fetch_blocking(conversation_id, caller, cursor, limit)
        })
        .await
        .map_err(|e| CoreError::Database(anyhow!("blocking task failed: {}", e)))?
    }

    fn fetch_blocking(
        &self,
        conversation_id: Uuid,
        caller: Uuid,
        cursor: Option<MessageCursor>,
        limit: u32,
    ) -> CoreResult<MessagePage> {
        let limit = limit.clamp(1, 200);
        self.registry.conversation(conversation_id)?;
        self.registry.ensure_participant(conversation_id, caller)?;

        let cursor_strings = cursor.map(|c| (time::to_storage(c.created_at), c.id.to_string()));
        let rows = self.db.messages_page(
            &conversation_id.to_string(),
            cursor_strings.as_ref().map(|(ts, id)| (ts.as_str(), id.as_str())),
            limit + 1,
        )?;

        let mut messages = rows
            .iter()
            .map(convert::message_from_row)
            .collect::<CoreResult<Vec<_>>>()?;

        let next_cursor = if messages.len() as u32 > limit {
            messages.truncate(limit as usize);
            messages.last().map(|m| MessageCursor {
                created_at: m.created_at,
                id: m.id,
            })
        } else {
            None
        };

        Ok(MessagePage {
            messages,
            next_cursor,
        })
    }

    /// Decrypt a message for the caller, degrading to the placeholder on
    /// any failure — a wrong key or corrupted ciphertext affects only the
    /// one message, never the call.
    pub fn reveal(&self, message: &EncryptedMessage, caller: Uuid) -> String {
        match self.try_reveal(message, caller) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "Message {} undecryptable for {}: {}",
                    message.id, caller, e
                );
                UNDECRYPTABLE_PLACEHOLDER.to_string()
            }
        }
    }

    fn try_reveal(&self, message: &EncryptedMessage, caller: Uuid) -> CoreResult<String> {
        let plaintext = match message.scheme {
            EncryptionScheme::Direct => {
                let private_key = self.keys.private_key(caller, caller)?;
                self.engine.decrypt_direct(&message.ciphertext, &private_key)?
            }
            EncryptionScheme::Group => {
                let wrapped_b64 = message
                    .wrapped_keys
                    .get(&caller)
                    .ok_or(CoreError::Decryption)?;
                let wrapped = B64.decode(wrapped_b64).map_err(|_| CoreError::Decryption)?;
                let private_key = self.keys.private_key(caller, caller)?;
                let key = self.engine.unwrap_key(&wrapped, &private_key)?;
                let nonce: [u8; 12] = message
                    .nonce
                    .as_slice()
                    .try_into()
                    .map_err(|_| CoreError::Decryption)?;
                self.engine.decrypt_group(&message.ciphertext, &key, &nonce)?
            }
        };
        String::from_utf8(plaintext).map_err(|_| CoreError::Decryption)
    }

    /// Toggle semantics: the same emoji removes the reaction, a different
    /// one replaces it; at most one reaction per (message, user).
    pub async fn react(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    ) -> CoreResult<ReactionChange> {
        if emoji.is_empty() || emoji.len() > 32 {
            return Err(CoreError::BadRequest("invalid emoji".into()));
        }

        let this = self.clone();
        let emoji_for_row = emoji.clone();
        let (conversation_id, change) = tokio::task::spawn_blocking(move || {
            let message = this
                .db
                .get_message(&message_id.to_string())?
                .ok_or(CoreError::MessageNotFound)?;
            let conversation_id = convert::parse_uuid(&message.conversation_id, "conversation id")?;
            this.registry.ensure_participant(conversation_id, user_id)?;

            let change = this.db.toggle_reaction(
                &Uuid::new_v4().to_string(),
                &message_id.to_string(),
                &user_id.to_string(),
                &emoji,
                &time::to_storage(Utc::now()),
            )?;
            Ok::<_, CoreError>((conversation_id, change))
        })
        .await
        .map_err(|e| CoreError::Database(anyhow!("blocking task failed: {}", e)))??;

        self.channel
            .publish(DeliveryEvent::update(
                conversation_id,
                "reactions",
                serde_json::json!({
                    "message_id": message_id,
                    "user_id": user_id,
                    "emoji": emoji_for_row,
                }),
            ))
            .await;

        Ok(change)
    }

    /// Sender-only tombstone: the row is retained so other participants'
    /// already-fetched ordering is not perturbed.
    pub async fn delete(&self, message_id: Uuid, caller: Uuid) -> CoreResult<()> {
        let this = self.clone();
        let conversation_id = tokio::task::spawn_blocking(move || {
            let message = this
                .db
                .get_message(&message_id.to_string())?
                .ok_or(CoreError::MessageNotFound)?;
            if message.sender_id != caller.to_string() {
                return Err(CoreError::NotAuthorized);
            }
            this.db
                .soft_delete_message(&message_id.to_string(), &time::to_storage(Utc::now()))?;
            convert::parse_uuid(&message.conversation_id, "conversation id")
        })
        .await
        .map_err(|e| CoreError::Database(anyhow!("blocking task failed: {}", e)))??;

        self.channel
            .publish(DeliveryEvent::update(
                conversation_id,
                "messages",
                serde_json::json!({ "id": message_id, "deleted": true }),
            ))
            .await;

        Ok(())
    }

    /// Advance the caller's read cursor; a later position never regresses.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        up_to: DateTime<Utc>,
    ) -> CoreResult<()> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            this.registry.conversation(conversation_id)?;
            this.registry.ensure_participant(conversation_id, user_id)?;
            this.db.mark_read(
                &conversation_id.to_string(),
                &user_id.to_string(),
                &time::to_storage(up_to),
            )?;
            Ok::<_, CoreError>(())
        })
        .await
        .map_err(|e| CoreError::Database(anyhow!("blocking task failed: {}", e)))?
    }

    pub async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> CoreResult<u32> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            this.registry.ensure_participant(conversation_id, user_id)?;
            Ok::<_, CoreError>(this
                .db
                .unread_count(&conversation_id.to_string(), &user_id.to_string())?)
        })
        .await
        .map_err(|e| CoreError::Database(anyhow!("blocking task failed: {}", e)))?
    }

    /// Reactions for a page of messages, batched.
    pub async fn reactions_for(
        &self,
        message_ids: Vec<Uuid>,
    ) -> CoreResult<Vec<agora_types::models::Reaction>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let ids: Vec<String> = message_ids.iter().map(|id| id.to_string()).collect();
            let rows = this.db.reactions_for_messages(&ids)?;
            rows.iter()
                .map(|row| {
                    Ok(agora_types::models::Reaction {
                        message_id: convert::parse_uuid(&row.message_id, "reaction message")?,
                        user_id: convert::parse_uuid(&row.user_id, "reaction user")?,
                        emoji: row.emoji.clone(),
                        created_at: convert::parse_ts(&row.created_at, "reaction created_at")?,
                    })
                })
                .collect::<CoreResult<Vec<_>>>()
        })
        .await
        .map_err(|e| CoreError::Database(anyhow!("blocking task failed: {}", e)))?
    }
}

fn message_row_json(message: &EncryptedMessage) -> serde_json::Value {
    serde_json::json!({
        "id": message.id,
        "conversation_id": message.conversation_id,
        "sender_id": message.sender_id,
        "scheme": message.scheme,
        "ciphertext": B64.encode(&message.ciphertext),
        "nonce": B64.encode(&message.nonce),
        "wrapped_keys": message.wrapped_keys,
        "created_at": message.created_at.to_rfc3339(),
    })
}
