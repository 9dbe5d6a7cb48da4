use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::models::{MappingRecord, StoreStatus};
use crate::services::RunSummary;
use crate::state::AppState;

#[derive(Deserialize)]
struct MappingQueryParams {
    #[serde(default)]
    include_archived: bool,
}

#[derive(Deserialize)]
struct SyncQueryParams {
    dry_run: Option<bool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/mappings", get(list_mappings))
        .route("/mappings/by-task/{task_id}", get(mapping_by_task))
        .route("/sync", post(sync_now))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(state.store.pool()).await?;
    Ok(StatusCode::OK)
}

async fn status(State(state): State<AppState>) -> Result<Json<StoreStatus>, AppError> {
    Ok(Json(state.store.status().await?))
}

async fn list_mappings(
    State(state): State<AppState>,
    Query(params): Query<MappingQueryParams>,
) -> Result<Json<Vec<MappingRecord>>, AppError> {
    let mappings = state.store.list(params.include_archived).await?;
    Ok(Json(mappings))
}

async fn mapping_by_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<MappingRecord>, AppError> {
    let mapping = state
        .store
        .get_by_target_id(&task_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(mapping))
}

async fn sync_now(
    State(state): State<AppState>,
    Query(params): Query<SyncQueryParams>,
) -> Result<Json<RunSummary>, AppError> {
    let _guard = state
        .run_guard
        .try_lock()
        .map_err(|_| AppError::SyncInProgress)?;

    let dry_run = params.dry_run.unwrap_or(state.sync.options().dry_run);
    info!("Sync requested via API (dry_run={})", dry_run);
    let summary = state.sync.run_with(dry_run).await?;
    Ok(Json(summary))
}
