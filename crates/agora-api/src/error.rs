use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use agora_core::{CoreError, CoreResult};

pub type ApiResult<T> = Result<T, ApiError>;

/// Maps core errors to HTTP responses. Referential and authorization
/// failures surface with their status; internals collapse to 500 with the
/// detail kept in the server log.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!("request failed: {}", self.0);
            return (
                status,
                Json(serde_json::json!({ "error": "internal server error" })),
            )
                .into_response();
        }

        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Run blocking core/database work off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError(CoreError::Database(anyhow::anyhow!("blocking task failed: {}", e)))
        })?
        .map_err(ApiError::from)
}
