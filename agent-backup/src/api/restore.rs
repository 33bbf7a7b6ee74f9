use super::error::{parse_body, AppError};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct RestoreRequest {
    pub filename: String,
}

/// Accept a restore; progress is polled through the status routes.
pub async fn start(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request: RestoreRequest = parse_body(&body)?;
    if request.filename.is_empty() {
        return Err(AppError::BadRequest("filename is required".into()));
    }

    let handle = state.restorer.start(&request.filename)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "restoreId": handle.id,
            "status": handle.status(),
        })),
    ))
}

pub async fn current(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "success": true, "status": state.restorer.status() }))
}

pub async fn by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let status = state
        .restorer
        .status_of(id)
        .ok_or_else(|| AppError::NotFound(format!("restore {} not found", id)))?;
    Ok(Json(json!({ "success": true, "status": status })))
}
