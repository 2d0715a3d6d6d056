//! Pure transition function of the polling state machine.
//!
//! [`decide`] sees only the run, the outcome of the step that just finished
//! and the replay time. It never reads a clock or touches the store, so the
//! same history always yields the same sequence of actions.

use chrono::{DateTime, Utc};

use courier_common::types::{
    ContentDescriptor, DeliveryOutcome, FetchOutcome, OrchestrationRun, RunState,
};

/// Outcome of the most recent step, as seen by [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastStep {
    /// The run was just (re)entered; no step has completed yet.
    Entered,
    Fetched(FetchOutcome),
    TimerFired,
    Delivered(DeliveryOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Make the next lookup attempt.
    Fetch,
    /// Durable wait, then re-enter `Polling`.
    Wait { until: DateTime<Utc> },
    /// Move to `Delivering` and hand the content to the notifier.
    Deliver(ContentDescriptor),
    /// Terminate `Completed`; `delivery_error` flags a failed delivery.
    Complete { delivery_error: Option<String> },
    /// Terminate `Expired`.
    Expire,
    /// Nothing left to do.
    Halt,
}

pub fn decide(run: &OrchestrationRun, last: &LastStep, now: DateTime<Utc>) -> Action {
    let past_deadline = now >= run.deadline_at;

    match run.state {
        RunState::Completed | RunState::Expired => Action::Halt,

        RunState::Polling => match last {
            LastStep::Entered | LastStep::TimerFired if past_deadline => Action::Expire,
            LastStep::Entered | LastStep::TimerFired => Action::Fetch,

            // A lookup that was in flight when the deadline passed still counts.
            LastStep::Fetched(FetchOutcome::Found(content)) => Action::Deliver(content.clone()),

            LastStep::Fetched(FetchOutcome::NotFound | FetchOutcome::Error(_)) => {
                if past_deadline {
                    Action::Expire
                } else {
                    Action::Wait {
                        until: now
                            .checked_add_signed(run.poll_interval())
                            .unwrap_or(DateTime::<Utc>::MAX_UTC),
                    }
                }
            }

            LastStep::Delivered(_) => Action::Halt,
        },

        RunState::Delivering => match last {
            LastStep::Delivered(DeliveryOutcome::Success) => Action::Complete {
                delivery_error: None,
            },
            LastStep::Delivered(DeliveryOutcome::Error(reason)) => Action::Complete {
                delivery_error: Some(reason.clone()),
            },
            // Entering with a stored descriptor and no delivery outcome yet.
            _ => match &run.result {
                Some(content) => Action::Deliver(content.clone()),
                None => Action::Halt,
            },
        },
    }
}
