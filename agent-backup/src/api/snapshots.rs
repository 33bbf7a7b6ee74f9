use super::error::{parse_body, AppError};
use crate::catalog::SnapshotKind;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<Value> {
    let page = state.catalog.list(query.page, query.page_size).await;
    Json(json!({
        "success": true,
        "backups": page.entries,
        "pagination": {
            "page": page.page,
            "pageSize": page.page_size,
            "total": page.total,
            "totalPages": page.total_pages,
        }
    }))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request: CreateRequest = parse_body(&body)?;
    let kind = match request.kind.as_deref() {
        Some(kind) => kind.parse::<SnapshotKind>()?,
        None => SnapshotKind::Manual,
    };

    let filename = state.builder.create(kind).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "filename": filename })),
    ))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.catalog.delete(&name).await?;
    Ok(Json(json!({ "success": true, "message": "Backup deleted" })))
}
