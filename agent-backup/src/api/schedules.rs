use super::error::{parse_body, AppError};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    #[serde(default)]
    pub cron: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl Default for CreateScheduleRequest {
    fn default() -> Self {
        Self {
            cron: String::new(),
            enabled: true,
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "success": true, "schedules": state.schedules.list() }))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request: CreateScheduleRequest = parse_body(&body)?;
    let schedule = state.schedules.create(&request.cron, request.enabled).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "schedule": schedule })),
    ))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.schedules.delete(&id).await?;
    Ok(Json(json!({ "success": true })))
}
