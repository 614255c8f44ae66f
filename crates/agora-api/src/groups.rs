use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use agora_types::api::{Claims, GroupMemberRequest, UpdateGroupMetadataRequest};

use crate::auth::AppState;
use crate::error::{ApiResult, run_blocking};

/// POST /conversations/{id}/members
/// Adding someone else requires admin status; joining yourself does not.
pub async fn add_member(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GroupMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.groups.clone();
    let caller = claims.sub;
    run_blocking(move || groups.add_member(conversation_id, caller, req.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /conversations/{id}/members/{user_id}
pub async fn remove_member(
    State(state): State<AppState>,
    Path((conversation_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.groups.clone();
    let caller = claims.sub;
    run_blocking(move || groups.remove_member(conversation_id, caller, user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /conversations/{id}/leave
pub async fn leave_group(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.groups.clone();
    let caller = claims.sub;
    run_blocking(move || groups.leave_group(conversation_id, caller)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /conversations/{id}/admins
pub async fn promote_admin(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GroupMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.groups.clone();
    let caller = claims.sub;
    run_blocking(move || groups.promote_admin(conversation_id, caller, req.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /conversations/{id}/admins/{user_id}
pub async fn demote_admin(
    State(state): State<AppState>,
    Path((conversation_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.groups.clone();
    let caller = claims.sub;
    run_blocking(move || groups.demote_admin(conversation_id, caller, user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /conversations/{id}/metadata
pub async fn update_metadata(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateGroupMetadataRequest>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.groups.clone();
    let caller = claims.sub;
    run_blocking(move || {
        groups.update_group_metadata(
            conversation_id,
            caller,
            req.name.as_deref(),
            req.image_url.as_deref(),
        )
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
