//! Background driving of runs, with bounded resumption.
//!
//! A run whose driving fails on an infrastructure error (store unreachable,
//! connection dropped) is re-driven by replay after a fixed backoff. After
//! `max_attempts` the run is left non-terminal; the next process start picks
//! it up again through [`RunDriver::resume_unfinished`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use courier_common::types::{DateKey, OrchestrationRun, PollPolicy};

use crate::controller::Orchestrator;
use crate::error::EngineError;

pub struct RunDriver {
    orchestrator: Arc<Orchestrator>,
    max_attempts: u32,
    backoff: Duration,
}

impl RunDriver {
    pub fn new(orchestrator: Arc<Orchestrator>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            orchestrator,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Drive `run_id`, re-driving after retryable failures.
    pub async fn drive(&self, run_id: Uuid) -> Result<OrchestrationRun, EngineError> {
        let mut attempt = 1;
        loop {
            match self.orchestrator.drive(run_id).await {
                Ok(run) => return Ok(run),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        run_id = %run_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Run interrupted, resuming after backoff"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drive `run_id` on its own task.
    pub fn spawn(self: &Arc<Self>, run_id: Uuid) -> JoinHandle<()> {
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = driver.drive(run_id).await {
                tracing::error!(
                    run_id = %run_id,
                    error = %e,
                    "Run stopped before reaching a terminal state"
                );
            }
        })
    }

    /// Create a run for `date_key` and drive it in the background.
    pub async fn start(
        self: &Arc<Self>,
        date_key: DateKey,
        policy: PollPolicy,
    ) -> Result<(Uuid, JoinHandle<()>), EngineError> {
        let run = self.orchestrator.start(date_key, policy).await?;
        Ok((run.run_id, self.spawn(run.run_id)))
    }

    /// Re-drive every run left non-terminal by a previous process.
    pub async fn resume_unfinished(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, EngineError> {
        let unfinished = self.orchestrator.store().list_unfinished().await?;
        if !unfinished.is_empty() {
            tracing::info!(count = unfinished.len(), "Resuming unfinished runs");
        }

        Ok(unfinished
            .into_iter()
            .map(|run| self.spawn(run.run_id))
            .collect())
    }
}
