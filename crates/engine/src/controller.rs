//! Orchestration controller.
//!
//! Drives one run through `Polling` → `Delivering` → `Completed`, or
//! `Polling` → `Expired`, by alternating [`decide`] with the step the decision
//! asks for. Driving always starts from the run's creation and replays the
//! recorded history, so the same call resumes a run after any restart. A run
//! resumed past its deadline expires without another lookup.

use std::sync::Arc;

use uuid::Uuid;

use courier_common::types::{
    DateKey, DeliveryOutcome, FailureKind, FailureReport, FetchOutcome, OrchestrationRun,
    PollPolicy, RunState,
};
use courier_fetcher::ContentFetcher;
use courier_notifier::Notifier;

use crate::clock::Clock;
use crate::context::RunContext;
use crate::decision::{Action, LastStep, decide};
use crate::error::EngineError;
use crate::store::RunStore;

pub struct Orchestrator {
    fetcher: Arc<dyn ContentFetcher>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn RunStore>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn RunStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            store,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Create a new run for `date_key`. The run is persisted but not driven.
    pub async fn start(
        &self,
        date_key: DateKey,
        policy: PollPolicy,
    ) -> Result<OrchestrationRun, EngineError> {
        let run = OrchestrationRun::new(Uuid::new_v4(), date_key, self.clock.now(), policy);
        self.store.create_run(&run).await?;

        tracing::info!(
            run_id = %run.run_id,
            date_key = %run.date_key,
            deadline_at = %run.deadline_at,
            poll_interval_secs = run.poll_interval_secs,
            "Run started"
        );

        Ok(run)
    }

    /// Drive a run to a terminal state, replaying whatever it already recorded.
    pub async fn drive(&self, run_id: Uuid) -> Result<OrchestrationRun, EngineError> {
        let stored = self
            .store
            .load_run(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))?;
        if stored.is_terminal() {
            return Ok(stored);
        }

        let history = self.store.load_steps(run_id).await?;
        let mut ctx = RunContext::new(&stored, history, self.store.as_ref(), self.clock.as_ref())?;
        if ctx.is_replaying() {
            tracing::info!(run_id = %run_id, "Resuming run from its step log");
        }

        let mut run = stored.restarted();
        let mut last = LastStep::Entered;

        loop {
            ctx.sync_time().await?;
            match decide(&run, &last, ctx.now()) {
                Action::Fetch => {
                    run.poll_count += 1;
                    if !ctx.is_replaying() {
                        tracing::info!(
                            run_id = %run.run_id,
                            date_key = %run.date_key,
                            poll_count = run.poll_count,
                            "Polling"
                        );
                    }

                    let outcome = ctx
                        .fetch(self.fetcher.as_ref(), run.date_key, run.poll_count)
                        .await?;
                    if !ctx.is_replaying() {
                        log_fetch(&run, &outcome);
                    }
                    ctx.checkpoint(&run).await?;
                    last = LastStep::Fetched(outcome);
                }

                Action::Wait { until } => {
                    ctx.wait_until(run.poll_count, until).await?;
                    last = LastStep::TimerFired;
                }

                Action::Deliver(content) => {
                    run.state = RunState::Delivering;
                    run.result = Some(content.clone());
                    ctx.checkpoint(&run).await?;
                    if !ctx.is_replaying() {
                        tracing::info!(
                            run_id = %run.run_id,
                            title = %content.title,
                            "Delivering"
                        );
                    }

                    let outcome = ctx.deliver(self.notifier.as_ref(), &content).await?;
                    last = LastStep::Delivered(outcome);
                }

                Action::Complete { delivery_error } => {
                    run.state = RunState::Completed;
                    run.delivery_error = delivery_error.clone();
                    run.finished_at = Some(ctx.now());

                    if let Some(reason) = delivery_error {
                        self.report(&mut ctx, &run, FailureKind::DeliveryFailed, reason)
                            .await?;
                    }
                    break;
                }

                Action::Expire => {
                    run.state = RunState::Expired;
                    run.finished_at = Some(ctx.now());

                    let detail = match &last {
                        LastStep::Fetched(FetchOutcome::Error(reason)) => format!(
                            "no content after {} attempts; last lookup failed: {}",
                            run.poll_count, reason
                        ),
                        _ => format!("no content after {} attempts", run.poll_count),
                    };
                    self.report(&mut ctx, &run, FailureKind::Expired, detail)
                        .await?;
                    break;
                }

                Action::Halt => {
                    return Err(EngineError::CorruptHistory {
                        run_id,
                        detail: format!("no way forward from state {}", run.state),
                    });
                }
            }
        }

        if ctx.is_replaying() {
            return Err(EngineError::CorruptHistory {
                run_id,
                detail: "recorded steps remain after the run finished".to_string(),
            });
        }
        ctx.checkpoint(&run).await?;
        tracing::info!(
            run_id = %run.run_id,
            date_key = %run.date_key,
            state = %run.state,
            poll_count = run.poll_count,
            delivery_error = run.delivery_error.as_deref(),
            replayed_steps = ctx.replayed(),
            "Run finished"
        );

        Ok(run)
    }

    /// Create a run and drive it to completion.
    pub async fn run(
        &self,
        date_key: DateKey,
        policy: PollPolicy,
    ) -> Result<OrchestrationRun, EngineError> {
        let run = self.start(date_key, policy).await?;
        self.drive(run.run_id).await
    }

    async fn report(
        &self,
        ctx: &mut RunContext<'_>,
        run: &OrchestrationRun,
        kind: FailureKind,
        detail: String,
    ) -> Result<(), EngineError> {
        let report = FailureReport {
            run_id: run.run_id,
            date_key: run.date_key,
            kind,
            detail,
        };
        if !ctx.is_replaying() {
            tracing::error!(
                run_id = %run.run_id,
                date_key = %run.date_key,
                kind = ?kind,
                detail = %report.detail,
                "Run failed"
            );
        }

        if let DeliveryOutcome::Error(reason) = ctx.report(self.notifier.as_ref(), &report).await? {
            // Reports are not retried; the run's record still carries the failure.
            tracing::error!(
                run_id = %run.run_id,
                notifier = self.notifier.name(),
                error = %reason,
                "Failed to send failure report"
            );
        }
        Ok(())
    }
}

fn log_fetch(run: &OrchestrationRun, outcome: &FetchOutcome) {
    match outcome {
        FetchOutcome::Found(content) => tracing::info!(
            run_id = %run.run_id,
            poll_count = run.poll_count,
            title = %content.title,
            locator = %content.locator,
            "Found"
        ),
        FetchOutcome::NotFound => tracing::debug!(
            run_id = %run.run_id,
            poll_count = run.poll_count,
            "Content not published yet"
        ),
        FetchOutcome::Error(reason) => tracing::warn!(
            run_id = %run.run_id,
            poll_count = run.poll_count,
            error = %reason,
            "Lookup failed"
        ),
    }
}
