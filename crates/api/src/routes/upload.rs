//! Admin image uploads.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::UploadError;
use crate::state::AppState;

/// Room for multipart framing around the file itself.
const MULTIPART_OVERHEAD: usize = 16 * 1024;

/// Build the upload router. Request bodies are capped a little above
/// `max_bytes` so oversized files are refused while streaming.
pub fn router(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", post(upload))
        .route("/{name}", delete(remove))
        .layer(DefaultBodyLimit::max(max_bytes.saturating_add(MULTIPART_OVERHEAD)))
}

/// Store the multipart field named `file`.
#[instrument(skip(state, admin, multipart), fields(admin_id = %admin.id))]
async fn upload(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().map(String::from);
        let bytes = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::Upload(UploadError::TooLarge(state.uploads().max_bytes()))
            } else {
                AppError::BadRequest(e.body_text())
            }
        })?;

        let stored = state.uploads().save(content_type.as_deref(), &bytes).await?;
        return Ok((StatusCode::CREATED, Json(stored)));
    }

    Err(UploadError::Empty.into())
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
async fn remove(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    state.uploads().delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
