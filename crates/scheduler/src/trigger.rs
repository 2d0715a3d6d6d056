//! Daily trigger on a cron schedule.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};

use courier_common::types::DateKey;

use crate::launcher::Launcher;

/// Fires on `cron` (six fields, seconds first), evaluated in the timezone
/// given by `offset`. Date keys are taken in the same timezone.
#[derive(Debug, Clone)]
pub struct DailyTrigger {
    cron: String,
    offset: FixedOffset,
}

impl DailyTrigger {
    pub fn new(cron: impl Into<String>, offset: FixedOffset) -> Self {
        Self {
            cron: cron.into(),
            offset,
        }
    }

    pub fn cron(&self) -> &str {
        &self.cron
    }

    /// The calendar date, in the trigger's timezone, at instant `at`.
    pub fn date_key_for(&self, at: DateTime<Utc>) -> DateKey {
        DateKey::new(at.with_timezone(&self.offset).date_naive())
    }

    /// Job that fires `launcher` on every tick of the schedule.
    pub fn job(&self, launcher: Arc<Launcher>) -> anyhow::Result<Job> {
        Job::new_async_tz(self.cron.as_str(), self.offset, move |_uuid, _scheduler| {
            let launcher = launcher.clone();
            Box::pin(async move {
                launcher.fire_scheduled().await;
            })
        })
        .with_context(|| format!("creating trigger job for cron {}", self.cron))
    }

    /// Scheduler with the trigger job registered. The caller starts it.
    pub async fn scheduler(&self, launcher: Arc<Launcher>) -> anyhow::Result<JobScheduler> {
        let scheduler = JobScheduler::new().await.context("creating scheduler")?;
        scheduler
            .add(self.job(launcher)?)
            .await
            .context("adding trigger job")?;
        Ok(scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_key_in_utc() {
        let trigger = DailyTrigger::new("0 0 9 * * *", FixedOffset::east_opt(0).unwrap());
        let at = Utc.with_ymd_and_hms(2023, 3, 7, 9, 0, 0).unwrap();
        assert_eq!(trigger.date_key_for(at).to_string(), "2023-03-07");
    }

    #[test]
    fn test_offset_moves_date_key_forward() {
        let trigger = DailyTrigger::new("0 0 9 * * *", FixedOffset::east_opt(2 * 3600).unwrap());
        // Already the 7th locally at 23:30 UTC on the 6th.
        let at = Utc.with_ymd_and_hms(2023, 3, 6, 23, 30, 0).unwrap();
        assert_eq!(trigger.date_key_for(at).to_string(), "2023-03-07");
    }

    #[test]
    fn test_offset_moves_date_key_back() {
        let trigger = DailyTrigger::new("0 0 9 * * *", FixedOffset::west_opt(5 * 3600).unwrap());
        let at = Utc.with_ymd_and_hms(2023, 3, 8, 3, 0, 0).unwrap();
        assert_eq!(trigger.date_key_for(at).to_string(), "2023-03-07");
    }
}
