use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use agora_core::{CoreError, MessageCursor};
use agora_types::api::{
    Claims, MarkReadRequest, MessagePageResponse, MessageResponse, ReactionGroup,
    SendMessageRequest,
};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Keyset cursor from a previous page's `next_cursor`; the sequence is
    /// restartable from any cursor at any time.
    pub cursor: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// POST /conversations/{id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let body = req.body.clone();
    let message = state
        .service
        .send(conversation_id, claims.sub, req.body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message.id,
            conversation_id,
            sender_id: claims.sub,
            body,
            created_at: message.created_at,
            edited_at: None,
            reactions: vec![],
        }),
    ))
}

/// GET /conversations/{id}/messages
/// One page in total (created_at, id) order, decrypted for the caller
/// with the placeholder substituted where decryption fails.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let cursor = match query.cursor.as_deref() {
        Some(raw) => Some(MessageCursor::decode(raw).ok_or_else(|| {
            ApiError(CoreError::BadRequest("malformed cursor".into()))
        })?),
        None => None,
    };

    let caller = claims.sub;
    let page = state
        .service
        .fetch(conversation_id, caller, cursor, query.limit)
        .await?;

    let message_ids: Vec<Uuid> = page.messages.iter().map(|m| m.id).collect();
    let reactions = state.service.reactions_for(message_ids).await?;

    // Group reactions by message -> emoji -> user ids
    let mut reaction_map: HashMap<Uuid, HashMap<String, Vec<Uuid>>> = HashMap::new();
    for reaction in &reactions {
        reaction_map
            .entry(reaction.message_id)
            .or_default()
            .entry(reaction.emoji.clone())
            .or_default()
            .push(reaction.user_id);
    }

    // Decryption is CPU-bound; run the whole page off the async runtime.
    let service = state.service.clone();
    let next_cursor = page.next_cursor.map(|c| c.encode());
    let messages = tokio::task::spawn_blocking(move || {
        page.messages
            .into_iter()
            .map(|message| {
                let body = service.reveal(&message, caller);
                let reactions = reaction_map
                    .remove(&message.id)
                    .map(|emoji_map| {
                        emoji_map
                            .into_iter()
                            .map(|(emoji, user_ids)| ReactionGroup {
                                emoji,
                                count: user_ids.len(),
                                user_ids,
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                MessageResponse {
                    id: message.id,
                    conversation_id: message.conversation_id,
                    sender_id: message.sender_id,
                    body,
                    created_at: message.created_at,
                    edited_at: message.edited_at,
                    reactions,
                }
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| {
        ApiError(CoreError::Database(anyhow::anyhow!(
            "blocking task failed: {}",
            e
        )))
    })?;

    Ok(Json(MessagePageResponse {
        messages,
        next_cursor,
    }))
}

/// DELETE /messages/{id}
/// Sender-only soft delete (tombstone).
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    state.service.delete(message_id, claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /conversations/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .service
        .mark_read(conversation_id, claims.sub, req.up_to)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /conversations/{id}/unread
pub async fn unread_count(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let count = state
        .service
        .unread_count(conversation_id, claims.sub)
        .await?;
    Ok(Json(serde_json::json!({ "unread": count })))
}
