//! Durable run store.
//!
//! Holds each run's record (the controller's projection) and its append-only
//! step log. The step log is the source of truth; the record can always be
//! rebuilt from it by replay.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{DateKey, OrchestrationRun};

use crate::step::{StepId, StepRecord};

pub use memory::InMemoryRunStore;
pub use postgres::PgRunStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("run {0} already exists")]
    RunExists(Uuid),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("step {step} of run {run_id} is already recorded")]
    DuplicateStep { run_id: Uuid, step: StepId },

    #[error("corrupt record for run {run_id}: {detail}")]
    Corrupt { run_id: Uuid, detail: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::RunNotFound(id) => AppError::NotFound(format!("Run {} not found", id)),
            other => AppError::Store(other.to_string()),
        }
    }
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new run record. Fails with `RunExists` if the id is taken.
    async fn create_run(&self, run: &OrchestrationRun) -> Result<(), StoreError>;

    async fn load_run(&self, run_id: Uuid) -> Result<Option<OrchestrationRun>, StoreError>;

    /// Overwrite the run's projection. A run already in a terminal state is
    /// never overwritten.
    async fn save_run(&self, run: &OrchestrationRun) -> Result<(), StoreError>;

    /// Append one step. Fails with `DuplicateStep` if the step id is recorded.
    async fn append_step(&self, run_id: Uuid, step: &StepRecord) -> Result<(), StoreError>;

    /// The run's step log, in append order.
    async fn load_steps(&self, run_id: Uuid) -> Result<Vec<StepRecord>, StoreError>;

    /// Runs not yet in a terminal state, oldest first.
    async fn list_unfinished(&self) -> Result<Vec<OrchestrationRun>, StoreError>;

    /// Runs searching for `date_key`, oldest first.
    async fn list_by_date(&self, date_key: DateKey) -> Result<Vec<OrchestrationRun>, StoreError>;
}
