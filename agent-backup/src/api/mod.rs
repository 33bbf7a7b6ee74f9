//! HTTP API over the backup engine.

pub mod error;
pub mod restore;
pub mod schedules;
pub mod settings;
pub mod snapshots;

use crate::state::AppState;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let backup = Router::new()
        .route("/list", get(snapshots::list))
        .route("/create", post(snapshots::create))
        .route("/delete/{name}", delete(snapshots::delete))
        .route("/restore", post(restore::start))
        .route("/restore/status", get(restore::current))
        .route("/restore/status/{id}", get(restore::by_id))
        .route("/config", get(settings::get).put(settings::update).post(settings::update))
        .route("/schedules", get(schedules::list).post(schedules::create))
        .route("/schedules/{id}", delete(schedules::delete));

    Router::new()
        .nest("/api/backup", backup)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
