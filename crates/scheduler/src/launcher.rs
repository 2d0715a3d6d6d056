//! Turns trigger firings into runs.

use std::sync::Arc;

use uuid::Uuid;

use courier_common::types::{DateKey, PollPolicy};
use courier_engine::{Clock, RunDriver};

use crate::guard::StartGuard;
use crate::trigger::DailyTrigger;

pub struct Launcher {
    trigger: DailyTrigger,
    guard: Arc<dyn StartGuard>,
    driver: Arc<RunDriver>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl Launcher {
    pub fn new(
        trigger: DailyTrigger,
        guard: Arc<dyn StartGuard>,
        driver: Arc<RunDriver>,
        clock: Arc<dyn Clock>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            trigger,
            guard,
            driver,
            clock,
            policy,
        }
    }

    /// Start the run for `date_key` unless one was already started.
    ///
    /// Returns the new run's id, or `None` if the date was already taken. If
    /// the start fails the guard is released, so a later firing can retry.
    pub async fn fire(&self, date_key: DateKey) -> anyhow::Result<Option<Uuid>> {
        if !self.guard.try_acquire(date_key).await? {
            tracing::info!(date_key = %date_key, "Run already started for this date, skipping");
            return Ok(None);
        }

        let started = self.start_unless_recorded(date_key).await;
        if started.is_err() {
            if let Err(e) = self.guard.release(date_key).await {
                tracing::error!(date_key = %date_key, error = %e, "Failed to release start guard");
            }
        }
        started
    }

    async fn start_unless_recorded(&self, date_key: DateKey) -> anyhow::Result<Option<Uuid>> {
        // The guard can lose its key (flush, failover); the store is authoritative.
        let existing = self
            .driver
            .orchestrator()
            .store()
            .list_by_date(date_key)
            .await?;
        if let Some(run) = existing.first() {
            tracing::info!(
                date_key = %date_key,
                run_id = %run.run_id,
                state = %run.state,
                "Run already recorded for this date, skipping"
            );
            return Ok(None);
        }

        let (run_id, _handle) = self.driver.start(date_key, self.policy).await?;
        Ok(Some(run_id))
    }

    /// Fire for the current date.
    pub async fn fire_now(&self) -> anyhow::Result<Option<Uuid>> {
        self.fire(self.trigger.date_key_for(self.clock.now())).await
    }

    /// Scheduled firing: like [`Launcher::fire_now`], with the outcome logged.
    pub async fn fire_scheduled(&self) {
        let date_key = self.trigger.date_key_for(self.clock.now());
        match self.fire(date_key).await {
            Ok(Some(run_id)) => {
                tracing::info!(date_key = %date_key, run_id = %run_id, "Trigger fired")
            }
            Ok(None) => {}
            Err(e) => tracing::error!(
                date_key = %date_key,
                error = %e,
                "Trigger failed to start a run"
            ),
        }
    }
}
