use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use agora_core::ReactionChange;
use agora_types::api::{Claims, ToggleReactionRequest};

use crate::auth::AppState;
use crate::error::ApiResult;

/// POST /messages/{id}/reactions
/// Toggle: the same emoji removes the reaction, a different one replaces
/// it; at most one reaction per (message, user).
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> ApiResult<impl IntoResponse> {
    let change = state
        .service
        .react(message_id, claims.sub, req.emoji)
        .await?;

    let status = match change {
        ReactionChange::Added => "added",
        ReactionChange::Removed => "removed",
        ReactionChange::Replaced { .. } => "replaced",
    };
    Ok(Json(serde_json::json!({ "status": status })))
}
