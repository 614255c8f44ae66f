//! Row-to-domain parsing. Rows are written by this core, so a parse
//! failure means storage corruption and surfaces as a Database error
//! rather than degrading silently.

use std::collections::HashMap;

use anyhow::anyhow;
use uuid::Uuid;

use agora_db::models::{ConversationRow, MessageRow, ParticipantRow};
use agora_types::models::{
    Conversation, ConversationKind, EncryptedMessage, EncryptionScheme, Participant,
};
use agora_types::time;

use crate::error::{CoreError, CoreResult};

pub(crate) fn parse_uuid(value: &str, what: &str) -> CoreResult<Uuid> {
    value
        .parse::<Uuid>()
        .map_err(|e| CoreError::Database(anyhow!("corrupt {} '{}': {}", what, value, e)))
}

pub(crate) fn parse_ts(value: &str, what: &str) -> CoreResult<chrono::DateTime<chrono::Utc>> {
    time::from_storage(value).map_err(|e| CoreError::Database(anyhow!("corrupt {}: {}", what, e)))
}

pub(crate) fn conversation_from_row(row: &ConversationRow) -> CoreResult<Conversation> {
    Ok(Conversation {
        id: parse_uuid(&row.id, "conversation id")?,
        kind: ConversationKind::parse(&row.kind)
            .ok_or_else(|| CoreError::Database(anyhow!("corrupt conversation kind '{}'", row.kind)))?,
        created_by: parse_uuid(&row.created_by, "conversation creator")?,
        group_name: row.group_name.clone(),
        group_image_url: row.group_image_url.clone(),
        created_at: parse_ts(&row.created_at, "conversation created_at")?,
    })
}

pub(crate) fn participant_from_row(row: &ParticipantRow) -> CoreResult<Participant> {
    Ok(Participant {
        conversation_id: parse_uuid(&row.conversation_id, "participant conversation")?,
        user_id: parse_uuid(&row.user_id, "participant user")?,
        joined_at: parse_ts(&row.joined_at, "participant joined_at")?,
        is_message_request: row.is_message_request,
        request_declined_at: row
            .request_declined_at
            .as_deref()
            .map(|v| parse_ts(v, "participant request_declined_at"))
            .transpose()?,
        last_read_at: row
            .last_read_at
            .as_deref()
            .map(|v| parse_ts(v, "participant last_read_at"))
            .transpose()?,
    })
}

pub(crate) fn message_from_row(row: &MessageRow) -> CoreResult<EncryptedMessage> {
    let wrapped_keys: HashMap<Uuid, String> = serde_json::from_str(&row.wrapped_keys)
        .map_err(|e| CoreError::Database(anyhow!("corrupt wrapped_keys on '{}': {}", row.id, e)))?;

    Ok(EncryptedMessage {
        id: parse_uuid(&row.id, "message id")?,
        conversation_id: parse_uuid(&row.conversation_id, "message conversation")?,
        sender_id: parse_uuid(&row.sender_id, "message sender")?,
        scheme: EncryptionScheme::parse(&row.scheme)
            .ok_or_else(|| CoreError::Database(anyhow!("corrupt message scheme '{}'", row.scheme)))?,
        ciphertext: row.ciphertext.clone(),
        nonce: row.nonce.clone(),
        wrapped_keys,
        created_at: parse_ts(&row.created_at, "message created_at")?,
        edited_at: row
            .edited_at
            .as_deref()
            .map(|v| parse_ts(v, "message edited_at"))
            .transpose()?,
        deleted_at: row
            .deleted_at
            .as_deref()
            .map(|v| parse_ts(v, "message deleted_at"))
            .transpose()?,
    })
}
