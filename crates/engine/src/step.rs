//! Step log model.
//!
//! Every externally visible action of a run (a lookup, a timer, a delivery, a
//! failure report) is written to the run's append-only log as a [`StepRecord`],
//! along with a `resumed` marker each time a drive starts executing live.
//! A step is identified by `(run_id, kind, seq)`; the store refuses a second
//! record for the same identifier, so a step can only ever be completed once.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_common::types::{DeliveryReply, FetchReply};

/// Sequence number shared by the once-per-run steps (delivery, report).
pub const ONCE_PER_RUN_SEQ: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Resumed,
    Fetch,
    TimerScheduled,
    TimerFired,
    DeliveryIntent,
    Delivery,
    ReportIntent,
    Report,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Resumed => "resumed",
            StepKind::Fetch => "fetch",
            StepKind::TimerScheduled => "timer_scheduled",
            StepKind::TimerFired => "timer_fired",
            StepKind::DeliveryIntent => "delivery_intent",
            StepKind::Delivery => "delivery",
            StepKind::ReportIntent => "report_intent",
            StepKind::Report => "report",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resumed" => Ok(StepKind::Resumed),
            "fetch" => Ok(StepKind::Fetch),
            "timer_scheduled" => Ok(StepKind::TimerScheduled),
            "timer_fired" => Ok(StepKind::TimerFired),
            "delivery_intent" => Ok(StepKind::DeliveryIntent),
            "delivery" => Ok(StepKind::Delivery),
            "report_intent" => Ok(StepKind::ReportIntent),
            "report" => Ok(StepKind::Report),
            other => Err(format!("unknown step kind '{}'", other)),
        }
    }
}

/// Stable identifier of a step within a run.
///
/// `seq` is the poll count of the attempt a fetch or timer belongs to,
/// [`ONCE_PER_RUN_SEQ`] for delivery and report steps, and the 1-based drive
/// number for `resumed` markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId {
    pub kind: StepKind,
    pub seq: u32,
}

impl StepId {
    pub fn new(kind: StepKind, seq: u32) -> Self {
        Self { kind, seq }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.seq)
    }
}

/// What a step recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    /// A drive caught up with its history; `recorded_at` is the time it did so.
    Resumed,
    Fetch { reply: FetchReply },
    TimerScheduled { fire_at: DateTime<Utc> },
    TimerFired,
    DeliveryIntent,
    Delivery { reply: DeliveryReply },
    ReportIntent,
    Report { reply: DeliveryReply },
}

impl StepEvent {
    pub fn kind(&self) -> StepKind {
        match self {
            StepEvent::Resumed => StepKind::Resumed,
            StepEvent::Fetch { .. } => StepKind::Fetch,
            StepEvent::TimerScheduled { .. } => StepKind::TimerScheduled,
            StepEvent::TimerFired => StepKind::TimerFired,
            StepEvent::DeliveryIntent => StepKind::DeliveryIntent,
            StepEvent::Delivery { .. } => StepKind::Delivery,
            StepEvent::ReportIntent => StepKind::ReportIntent,
            StepEvent::Report { .. } => StepKind::Report,
        }
    }
}

/// One entry of a run's step log.
///
/// `recorded_at` is read from the clock once, when the step runs live; replay
/// uses it as the run's current time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub seq: u32,
    pub event: StepEvent,
    pub recorded_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn id(&self) -> StepId {
        StepId::new(self.event.kind(), self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_kind_text_round_trip() {
        for kind in [
            StepKind::Resumed,
            StepKind::Fetch,
            StepKind::TimerScheduled,
            StepKind::TimerFired,
            StepKind::DeliveryIntent,
            StepKind::Delivery,
            StepKind::ReportIntent,
            StepKind::Report,
        ] {
            assert_eq!(kind.as_str().parse::<StepKind>().unwrap(), kind);
        }
        assert!("retry".parse::<StepKind>().is_err());
    }

    #[test]
    fn test_event_payload_is_tagged() {
        let event = StepEvent::Fetch {
            reply: FetchReply {
                found: false,
                title: None,
                locator: None,
                error: Some("timeout".to_string()),
            },
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "fetch");
        assert_eq!(v["reply"]["found"], false);
        assert_eq!(v["reply"]["error"], "timeout");

        let back: StepEvent = serde_json::from_value(v).unwrap();
        assert_eq!(back.kind(), StepKind::Fetch);
    }

    #[test]
    fn test_step_id_display() {
        assert_eq!(StepId::new(StepKind::Fetch, 3).to_string(), "fetch#3");
        assert_eq!(
            StepId::new(StepKind::Delivery, ONCE_PER_RUN_SEQ).to_string(),
            "delivery#0"
        );
    }
}
