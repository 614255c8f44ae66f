use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
    Channel,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Direct => "direct",
            ConversationKind::Group => "group",
            ConversationKind::Channel => "channel",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(ConversationKind::Direct),
            "group" => Some(ConversationKind::Group),
            "channel" => Some(ConversationKind::Channel),
            _ => None,
        }
    }

    pub fn is_multi_party(&self) -> bool {
        !matches!(self, ConversationKind::Direct)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub created_by: Uuid,
    pub group_name: Option<String>,
    pub group_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    /// Pending direct conversation from a non-contact; cleared on acceptance.
    pub is_message_request: bool,
    pub request_declined_at: Option<DateTime<Utc>>,
    pub last_read_at: Option<DateTime<Utc>>,
}

/// Which cryptographic scheme produced a message's ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionScheme {
    /// RSA-OAEP to the recipient's public key. No nonce, no wrapped keys.
    Direct,
    /// AES-256-GCM envelope; the per-message key is wrapped per recipient.
    Group,
}

impl EncryptionScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionScheme::Direct => "direct",
            EncryptionScheme::Group => "group",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(EncryptionScheme::Direct),
            "group" => Some(EncryptionScheme::Group),
            _ => None,
        }
    }
}

/// Messages stored on the server are always ciphertext.
/// The core only sees plaintext transiently while encrypting or revealing.
#[derive(Debug, Clone)]
pub struct EncryptedMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub scheme: EncryptionScheme,
    pub ciphertext: Vec<u8>,
    /// 96-bit GCM nonce for the group scheme; empty for direct.
    pub nonce: Vec<u8>,
    /// Per-recipient OAEP-wrapped copies of the message key, base64-encoded.
    /// Empty for the direct scheme.
    pub wrapped_keys: HashMap<Uuid, String>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// Read-only projection supplied by the profile-lookup collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}
