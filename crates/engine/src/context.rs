//! Replay context for one run.
//!
//! A [`RunContext`] is built from the run's recorded steps, in the order they
//! were appended. Each step the controller performs is first matched against
//! the next recorded step: a match is consumed and its outcome returned
//! without touching the outside world; once history is exhausted, steps are
//! executed live and appended before their outcome is used. The context's
//! clock is the `recorded_at` of the last consumed step, so replayed decisions
//! see exactly the time they saw the first time.
//!
//! The first decision a drive makes live records a `resumed` marker carrying
//! the current time. A run picked up hours after its last step therefore
//! decides on the real time, and every later replay sees that same time at
//! the same point.

use std::collections::{HashSet, VecDeque};
use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_common::types::{
    ContentDescriptor, DateKey, DeliveryOutcome, DeliveryReply, FailureReport, FetchOutcome,
    FetchReply, OrchestrationRun,
};
use courier_fetcher::ContentFetcher;
use courier_notifier::Notifier;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::step::{ONCE_PER_RUN_SEQ, StepEvent, StepId, StepKind, StepRecord};
use crate::store::RunStore;

/// Completion recorded for a side effect whose intent was written but whose
/// result never was.
pub const OUTCOME_UNKNOWN: &str = "outcome unknown after restart";

pub struct RunContext<'a> {
    run_id: Uuid,
    store: &'a dyn RunStore,
    clock: &'a dyn Clock,
    recorded: VecDeque<StepRecord>,
    replayed: usize,
    resumes: u32,
    resumed_live: bool,
    now: DateTime<Utc>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        run: &OrchestrationRun,
        history: Vec<StepRecord>,
        store: &'a dyn RunStore,
        clock: &'a dyn Clock,
    ) -> Result<Self, EngineError> {
        let mut seen = HashSet::with_capacity(history.len());
        for step in &history {
            let id = step.id();
            if !seen.insert(id) {
                return Err(EngineError::CorruptHistory {
                    run_id: run.run_id,
                    detail: format!("step {} recorded twice", id),
                });
            }
        }

        Ok(Self {
            run_id: run.run_id,
            store,
            clock,
            recorded: history.into(),
            replayed: 0,
            resumes: 0,
            resumed_live: false,
            now: run.started_at,
        })
    }

    /// Replay time: `started_at` until the first step, then the time the
    /// latest step was recorded.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// True while recorded steps remain to be consumed.
    pub fn is_replaying(&self) -> bool {
        !self.recorded.is_empty()
    }

    /// Number of recorded steps consumed so far.
    pub fn replayed(&self) -> usize {
        self.replayed
    }

    /// Consume the next recorded step if it is `id`.
    fn take(&mut self, id: StepId) -> Option<StepRecord> {
        if self.recorded.front()?.id() != id {
            return None;
        }
        let step = self.recorded.pop_front()?;
        self.replayed += 1;
        self.now = step.recorded_at;
        Some(step)
    }

    fn ensure_live(&self, id: StepId) -> Result<(), EngineError> {
        if self.recorded.is_empty() {
            return Ok(());
        }
        Err(EngineError::ReplayDivergence {
            run_id: self.run_id,
            step: id,
            unconsumed: self.recorded.len(),
        })
    }

    async fn record(&mut self, seq: u32, event: StepEvent) -> Result<(), EngineError> {
        let step = StepRecord {
            seq,
            event,
            recorded_at: self.clock.now(),
        };
        self.store.append_step(self.run_id, &step).await?;
        self.now = step.recorded_at;
        Ok(())
    }

    fn corrupt(&self, id: StepId, found: &StepEvent) -> EngineError {
        EngineError::CorruptHistory {
            run_id: self.run_id,
            detail: format!("step {} holds a {} event", id, found.kind()),
        }
    }

    /// Bring the replay time up to date before a decision.
    ///
    /// Recorded `resumed` markers are consumed where they were written. The
    /// first call made with no history left records this drive's marker.
    pub async fn sync_time(&mut self) -> Result<(), EngineError> {
        while let Some(id) = self
            .recorded
            .front()
            .map(StepRecord::id)
            .filter(|id| id.kind == StepKind::Resumed)
        {
            self.take(id);
            self.resumes += 1;
        }

        if self.is_replaying() || self.resumed_live {
            return Ok(());
        }
        self.resumes += 1;
        self.record(self.resumes, StepEvent::Resumed).await?;
        self.resumed_live = true;
        Ok(())
    }

    /// Lookup attempt number `seq`.
    pub async fn fetch(
        &mut self,
        fetcher: &dyn ContentFetcher,
        date_key: DateKey,
        seq: u32,
    ) -> Result<FetchOutcome, EngineError> {
        let id = StepId::new(StepKind::Fetch, seq);
        if let Some(step) = self.take(id) {
            return match step.event {
                StepEvent::Fetch { reply } => Ok(reply.into()),
                other => Err(self.corrupt(id, &other)),
            };
        }

        self.ensure_live(id)?;
        let outcome = fetcher.fetch(date_key).await;
        self.record(
            seq,
            StepEvent::Fetch {
                reply: FetchReply::from(&outcome),
            },
        )
        .await?;
        Ok(outcome)
    }

    /// Durable wait belonging to attempt `seq`.
    ///
    /// The fire time is fixed when the timer is first scheduled; a timer that
    /// was scheduled but never fired before a restart waits out the remainder.
    pub async fn wait_until(
        &mut self,
        seq: u32,
        until: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let scheduled = StepId::new(StepKind::TimerScheduled, seq);
        let fire_at = match self.take(scheduled) {
            Some(step) => match step.event {
                StepEvent::TimerScheduled { fire_at } => fire_at,
                other => return Err(self.corrupt(scheduled, &other)),
            },
            None => {
                self.ensure_live(scheduled)?;
                self.record(seq, StepEvent::TimerScheduled { fire_at: until })
                    .await?;
                until
            }
        };

        let fired = StepId::new(StepKind::TimerFired, seq);
        if self.take(fired).is_some() {
            return Ok(());
        }

        self.ensure_live(fired)?;
        self.clock.sleep_until(fire_at).await;
        self.record(seq, StepEvent::TimerFired).await
    }

    /// The run's single delivery.
    pub async fn deliver(
        &mut self,
        notifier: &dyn Notifier,
        content: &ContentDescriptor,
    ) -> Result<DeliveryOutcome, EngineError> {
        self.once(
            StepEvent::DeliveryIntent,
            StepKind::Delivery,
            notifier.deliver(content),
        )
        .await
    }

    /// The run's single operator failure report.
    pub async fn report(
        &mut self,
        notifier: &dyn Notifier,
        report: &FailureReport,
    ) -> Result<DeliveryOutcome, EngineError> {
        self.once(
            StepEvent::ReportIntent,
            StepKind::Report,
            notifier.report_failure(report),
        )
        .await
    }

    /// Run a non-idempotent side effect at most once per run.
    ///
    /// The intent is appended before `effect` is polled. If history holds the
    /// intent but not the completion, the process stopped mid-call: the effect
    /// is not polled again and the outcome is recorded as unknown.
    async fn once<F>(
        &mut self,
        intent: StepEvent,
        completion: StepKind,
        effect: F,
    ) -> Result<DeliveryOutcome, EngineError>
    where
        F: Future<Output = DeliveryOutcome>,
    {
        let intent_id = StepId::new(intent.kind(), ONCE_PER_RUN_SEQ);
        let completion_id = StepId::new(completion, ONCE_PER_RUN_SEQ);

        let recorded_intent = self.take(intent_id);
        if let Some(step) = self.take(completion_id) {
            return match step.event {
                StepEvent::Delivery { reply } | StepEvent::Report { reply } => Ok(reply.into()),
                other => Err(self.corrupt(completion_id, &other)),
            };
        }

        self.ensure_live(completion_id)?;
        let outcome = if recorded_intent.is_some() {
            tracing::warn!(
                run_id = %self.run_id,
                step = %completion_id,
                "Side effect interrupted before its outcome was recorded; not repeating it"
            );
            DeliveryOutcome::Error(OUTCOME_UNKNOWN.to_string())
        } else {
            self.record(ONCE_PER_RUN_SEQ, intent).await?;
            effect.await
        };

        let reply = DeliveryReply::from(&outcome);
        let event = match completion {
            StepKind::Report => StepEvent::Report { reply },
            _ => StepEvent::Delivery { reply },
        };
        self.record(ONCE_PER_RUN_SEQ, event).await?;
        Ok(outcome)
    }

    /// Persist the run's projection. Skipped while replaying, so a restart
    /// never writes an older view of the run over a newer one.
    pub async fn checkpoint(&self, run: &OrchestrationRun) -> Result<(), EngineError> {
        if self.is_replaying() {
            return Ok(());
        }
        self.store.save_run(run).await?;
        Ok(())
    }
}
