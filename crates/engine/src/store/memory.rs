//! In-memory run store (tests and single-process development).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use courier_common::types::{DateKey, OrchestrationRun};

use super::{RunStore, StoreError};
use crate::step::StepRecord;

struct RunEntry {
    run: OrchestrationRun,
    steps: Vec<StepRecord>,
}

/// Run store backed by a map; nothing survives the process.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, RunEntry>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut runs: Vec<OrchestrationRun>) -> Vec<OrchestrationRun> {
    runs.sort_by_key(|r| (r.started_at, r.run_id));
    runs
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_run(&self, run: &OrchestrationRun) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.run_id) {
            return Err(StoreError::RunExists(run.run_id));
        }
        runs.insert(
            run.run_id,
            RunEntry {
                run: run.clone(),
                steps: Vec::new(),
            },
        );
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<OrchestrationRun>, StoreError> {
        Ok(self.runs.read().await.get(&run_id).map(|e| e.run.clone()))
    }

    async fn save_run(&self, run: &OrchestrationRun) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let entry = runs
            .get_mut(&run.run_id)
            .ok_or(StoreError::RunNotFound(run.run_id))?;
        if !entry.run.is_terminal() {
            entry.run = run.clone();
        }
        Ok(())
    }

    async fn append_step(&self, run_id: Uuid, step: &StepRecord) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let entry = runs.get_mut(&run_id).ok_or(StoreError::RunNotFound(run_id))?;

        let id = step.id();
        if entry.steps.iter().any(|s| s.id() == id) {
            return Err(StoreError::DuplicateStep { run_id, step: id });
        }
        entry.steps.push(step.clone());
        Ok(())
    }

    async fn load_steps(&self, run_id: Uuid) -> Result<Vec<StepRecord>, StoreError> {
        Ok(self
            .runs
            .read()
            .await
            .get(&run_id)
            .map(|e| e.steps.clone())
            .unwrap_or_default())
    }

    async fn list_unfinished(&self) -> Result<Vec<OrchestrationRun>, StoreError> {
        let runs = self.runs.read().await;
        Ok(sorted(
            runs.values()
                .filter(|e| !e.run.is_terminal())
                .map(|e| e.run.clone())
                .collect(),
        ))
    }

    async fn list_by_date(&self, date_key: DateKey) -> Result<Vec<OrchestrationRun>, StoreError> {
        let runs = self.runs.read().await;
        Ok(sorted(
            runs.values()
                .filter(|e| e.run.date_key == date_key)
                .map(|e| e.run.clone())
                .collect(),
        ))
    }
}
