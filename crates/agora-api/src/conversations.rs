use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use agora_core::CoreResult;
use agora_db::Database;
use agora_types::api::{Claims, ConversationResponse, CreateDirectRequest, CreateGroupRequest};
use agora_types::models::{Conversation, ConversationKind, Profile};

use crate::auth::AppState;
use crate::error::{ApiResult, run_blocking};

fn to_response(
    db: &Database,
    conversation: Conversation,
    caller: Uuid,
) -> CoreResult<ConversationResponse> {
    let participant = db.participant(&conversation.id.to_string(), &caller.to_string())?;
    let unread_count = db.unread_count(&conversation.id.to_string(), &caller.to_string())?;
    Ok(ConversationResponse {
        id: conversation.id,
        kind: conversation.kind,
        created_by: conversation.created_by,
        group_name: conversation.group_name,
        group_image_url: conversation.group_image_url,
        created_at: conversation.created_at,
        is_message_request: participant.map(|p| p.is_message_request).unwrap_or(false),
        unread_count,
    })
}

/// POST /conversations/direct
/// Get-or-create semantics: concurrent first contact from both sides
/// resolves to the same conversation.
pub async fn create_direct(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateDirectRequest>,
) -> ApiResult<impl IntoResponse> {
    let registry = state.registry.clone();
    let db = state.db.clone();
    let caller = claims.sub;

    let response = run_blocking(move || {
        let conversation = registry.get_or_create_direct(caller, req.peer_id)?;
        to_response(&db, conversation, caller)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /conversations/group
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let registry = state.registry.clone();
    let db = state.db.clone();
    let caller = claims.sub;

    let response = run_blocking(move || {
        let conversation = registry.create_group(
            caller,
            &req.name,
            &req.member_ids,
            req.image_url.as_deref(),
            req.kind.unwrap_or(ConversationKind::Group),
        )?;
        to_response(&db, conversation, caller)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /conversations — the main inbox.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let registry = state.registry.clone();
    let db = state.db.clone();
    let caller = claims.sub;

    let responses = run_blocking(move || {
        registry
            .conversations_for(caller)?
            .into_iter()
            .map(|conversation| to_response(&db, conversation, caller))
            .collect::<CoreResult<Vec<_>>>()
    })
    .await?;

    Ok(Json(responses))
}

/// GET /conversations/requests — pending message requests, kept out of
/// the main inbox until the recipient decides.
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let registry = state.registry.clone();
    let db = state.db.clone();
    let caller = claims.sub;

    let responses = run_blocking(move || {
        registry
            .requests_for(caller)?
            .into_iter()
            .map(|conversation| to_response(&db, conversation, caller))
            .collect::<CoreResult<Vec<_>>>()
    })
    .await?;

    Ok(Json(responses))
}

/// POST /conversations/{id}/requests/accept
pub async fn accept_request(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let registry = state.registry.clone();
    let caller = claims.sub;
    run_blocking(move || registry.accept_request(conversation_id, caller)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /conversations/{id}/requests/decline
/// Marks declined but preserves history until an explicit delete.
pub async fn decline_request(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let registry = state.registry.clone();
    let caller = claims.sub;
    run_blocking(move || registry.decline_request(conversation_id, caller)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /profiles/{user_id}
/// Read-only projection from the profile-lookup collaborator, used for
/// rendering next to decrypted messages.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Profile>, StatusCode> {
    let registry = state.registry.clone();
    let profile = tokio::task::spawn_blocking(move || registry.profile_of(user_id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    profile.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// DELETE /conversations/{id}/requests
/// Irrevocable: removes the conversation and all of its messages.
pub async fn delete_request(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let registry = state.registry.clone();
    let caller = claims.sub;
    run_blocking(move || registry.delete_request(conversation_id, caller)).await?;
    Ok(StatusCode::NO_CONTENT)
}
