use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use agora_crypto::keys::{KeyStore, public_key_to_pem};
use agora_types::api::{Claims, PublicKeyResponse};

use crate::auth::AppState;
use crate::error::{ApiResult, run_blocking};

/// POST /keys
/// Generate the caller's key pair on first use of encrypted messaging.
/// Idempotent: an existing pair is returned untouched.
pub async fn generate_keys(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let keys = state.keys.clone();
    let user_id = claims.sub;
    let pem = run_blocking(move || {
        let pair = keys.generate_key_pair(user_id)?;
        Ok(public_key_to_pem(&pair.public_key)?)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(PublicKeyResponse {
            user_id,
            public_key_pem: pem,
        }),
    ))
}

/// GET /keys/{user_id}
/// Public half only — the private key never crosses this boundary.
pub async fn get_public_key(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let keys = state.keys.clone();
    let pem = run_blocking(move || {
        let public_key = keys.public_key(user_id)?;
        Ok(public_key_to_pem(&public_key)?)
    })
    .await?;

    Ok(Json(PublicKeyResponse {
        user_id,
        public_key_pem: pem,
    }))
}
