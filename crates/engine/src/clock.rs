//! Clock port.
//!
//! The engine reads wall-clock time and sleeps only through [`Clock`], so
//! tests can drive a run through hours of polling instantly.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Suspend until `deadline`; returns immediately if it already passed.
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

/// Production clock: `Utc::now` plus tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        // Negative remaining time (deadline passed while down) means no wait.
        if let Ok(remaining) = (deadline - Utc::now()).to_std() {
            tokio::time::sleep(remaining).await;
        }
    }
}

/// Clock that only moves when told to; sleeping jumps straight to the deadline.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if deadline > *now {
            *now = deadline;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_manual_clock_sleep_jumps_forward_only() {
        let start = Utc.with_ymd_and_hms(2023, 3, 7, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        clock.sleep_until(start + chrono::Duration::minutes(5)).await;
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));

        clock.sleep_until(start).await;
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(330));
    }

    #[tokio::test]
    async fn test_system_clock_past_deadline_returns() {
        SystemClock
            .sleep_until(Utc::now() - chrono::Duration::hours(1))
            .await;
    }
}
