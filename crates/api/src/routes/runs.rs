//! Run status routes.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{DateKey, OrchestrationRun};
use courier_engine::step::StepRecord;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/runs", get(list_runs))
        .route("/api/runs/{id}", get(get_run))
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub date_key: Option<String>,
}

/// A run together with its step log.
#[derive(Debug, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: OrchestrationRun,
    pub steps: Vec<StepRecord>,
}

/// GET /api/runs — Runs for `date_key`, or every unfinished run without it.
async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<OrchestrationRun>>, AppError> {
    let runs = match query.date_key {
        Some(raw) => {
            let date_key: DateKey = raw.parse().map_err(|_| {
                AppError::Validation(format!("Invalid date_key '{}', expected YYYY-MM-DD", raw))
            })?;
            state.store.list_by_date(date_key).await?
        }
        None => state.store.list_unfinished().await?,
    };
    Ok(Json(runs))
}

/// GET /api/runs/:id — One run and its recorded steps.
async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunDetail>, AppError> {
    let run = state
        .store
        .load_run(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {} not found", id)))?;
    let steps = state.store.load_steps(id).await?;

    Ok(Json(RunDetail { run, steps }))
}
