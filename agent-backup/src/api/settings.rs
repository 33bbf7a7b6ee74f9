use super::error::{parse_body, AppError};
use crate::state::AppState;
use crate::store::RetentionUpdate;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn get(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "success": true, "config": state.catalog.retention() }))
}

/// Persist new retention settings, then prune against them.
pub async fn update(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let update: RetentionUpdate = parse_body(&body)?;
    let config = state.catalog.update_retention(update).await?;
    Ok(Json(json!({ "success": true, "config": config })))
}
