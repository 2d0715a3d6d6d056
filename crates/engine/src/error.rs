use thiserror::Error;
use uuid::Uuid;

use courier_common::error::AppError;

use crate::step::StepId;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    /// Replay reached a step that is not recorded while recorded steps remain
    /// unconsumed: the history does not match the decision logic.
    #[error("run {run_id} diverged from its history at {step} ({unconsumed} recorded steps unconsumed)")]
    ReplayDivergence {
        run_id: Uuid,
        step: StepId,
        unconsumed: usize,
    },

    #[error("corrupt history for run {run_id}: {detail}")]
    CorruptHistory { run_id: Uuid, detail: String },
}

impl EngineError {
    /// Whether driving the run again (by replay) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Store(StoreError::Database(_) | StoreError::Unavailable(_))
        )
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Store(e) => e.into(),
            EngineError::RunNotFound(id) => AppError::NotFound(format!("Run {} not found", id)),
            other => AppError::Internal(other.to_string()),
        }
    }
}
