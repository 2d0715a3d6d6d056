//! Delivery side of the courier.
//!
//! A [`Notifier`] sends the found content to the notification destination and
//! sends operator failure reports to the fallback destination. Both calls are
//! side-effecting and NOT idempotent: calling twice may produce two visible
//! messages. Keeping each call to a single invocation is the orchestration
//! engine's job.

pub mod telegram;

use async_trait::async_trait;

use courier_common::types::{ContentDescriptor, DeliveryOutcome, FailureReport};

pub use telegram::TelegramNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send the content to the notification destination.
    async fn deliver(&self, content: &ContentDescriptor) -> DeliveryOutcome;

    /// Send a failure report to the fallback destination.
    async fn report_failure(&self, report: &FailureReport) -> DeliveryOutcome;

    /// Human-readable name for logs (e.g., "telegram").
    fn name(&self) -> &'static str;
}
