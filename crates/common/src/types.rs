use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Scheme every stored locator must carry.
pub const LOCATOR_SCHEME: &str = "https:";

/// Calendar date a run searches for, rendered as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub const FORMAT: &'static str = "%Y-%m-%d";

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl FromStr for DateKey {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, Self::FORMAT).map(Self)
    }
}

impl TryFrom<String> for DateKey {
    type Error = chrono::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.to_string()
    }
}

/// Why a descriptor could not be built from what the source returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("content locator is empty")]
    EmptyLocator,
}

/// The found content: a title and a scheme-complete locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    pub title: String,
    pub locator: String,
}

impl ContentDescriptor {
    /// Build a descriptor, normalizing the locator so it always carries a scheme.
    pub fn new(
        title: impl Into<String>,
        locator: impl AsRef<str>,
    ) -> Result<Self, DescriptorError> {
        let locator = locator.as_ref().trim();
        if locator.is_empty() {
            return Err(DescriptorError::EmptyLocator);
        }

        Ok(Self {
            title: title.into(),
            locator: normalize_locator(locator),
        })
    }
}

/// Prepend the scheme to a locator that lacks one.
///
/// - `//host/path` → `https://host/path`
/// - `host/path` → `https://host/path`
/// - anything already carrying a scheme (`https://`, `HTTP://`, ...) is left as-is
pub fn normalize_locator(locator: &str) -> String {
    if has_scheme(locator) {
        locator.to_string()
    } else if locator.starts_with("//") {
        format!("{}{}", LOCATOR_SCHEME, locator)
    } else {
        format!("{}//{}", LOCATOR_SCHEME, locator)
    }
}

/// `scheme://` prefix, matched case-insensitively. A port (`host:8080/x`)
/// is not a scheme.
fn has_scheme(locator: &str) -> bool {
    locator.split_once(':').is_some_and(|(scheme, rest)| {
        rest.starts_with("//")
            && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Result of one content lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(ContentDescriptor),
    NotFound,
    Error(String),
}

impl FetchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, FetchOutcome::Found(_))
    }
}

/// Wire shape of a lookup result: `{found, title?, locator?, error?}`.
///
/// This is also the shape recorded in the step log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReply {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&FetchOutcome> for FetchReply {
    fn from(outcome: &FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Found(content) => Self {
                found: true,
                title: Some(content.title.clone()),
                locator: Some(content.locator.clone()),
                error: None,
            },
            FetchOutcome::NotFound => Self {
                found: false,
                title: None,
                locator: None,
                error: None,
            },
            FetchOutcome::Error(reason) => Self {
                found: false,
                title: None,
                locator: None,
                error: Some(reason.clone()),
            },
        }
    }
}

impl From<FetchReply> for FetchOutcome {
    fn from(reply: FetchReply) -> Self {
        if let Some(error) = reply.error {
            return FetchOutcome::Error(error);
        }
        if !reply.found {
            return FetchOutcome::NotFound;
        }

        match ContentDescriptor::new(
            reply.title.unwrap_or_default(),
            reply.locator.unwrap_or_default(),
        ) {
            Ok(content) => FetchOutcome::Found(content),
            Err(e) => FetchOutcome::Error(e.to_string()),
        }
    }
}

/// Result of one delivery (or failure report) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Success,
    Error(String),
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Success => None,
            DeliveryOutcome::Error(reason) => Some(reason),
        }
    }
}

/// Wire shape of a delivery result: `{success, error?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&DeliveryOutcome> for DeliveryReply {
    fn from(outcome: &DeliveryOutcome) -> Self {
        match outcome {
            DeliveryOutcome::Success => Self {
                success: true,
                error: None,
            },
            DeliveryOutcome::Error(reason) => Self {
                success: false,
                error: Some(reason.clone()),
            },
        }
    }
}

impl From<DeliveryReply> for DeliveryOutcome {
    fn from(reply: DeliveryReply) -> Self {
        if reply.success {
            DeliveryOutcome::Success
        } else {
            DeliveryOutcome::Error(
                reply
                    .error
                    .unwrap_or_else(|| "delivery failed without detail".to_string()),
            )
        }
    }
}

/// Orchestration run states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Polling,
    Delivering,
    Completed,
    Expired,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Expired)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Polling => write!(f, "polling"),
            RunState::Delivering => write!(f, "delivering"),
            RunState::Completed => write!(f, "completed"),
            RunState::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" => Ok(RunState::Polling),
            "delivering" => Ok(RunState::Delivering),
            "completed" => Ok(RunState::Completed),
            "expired" => Ok(RunState::Expired),
            other => Err(format!("unknown run state '{}'", other)),
        }
    }
}

/// Poll cadence and deadline window, fixed when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5 * 60),
            max_wait: Duration::from_secs(60 * 60),
        }
    }
}

/// One orchestration run for one date key.
///
/// `run_id`, `date_key`, `started_at`, `deadline_at` and `poll_interval_secs`
/// never change after creation; the rest is the controller's projection of
/// the step log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationRun {
    pub run_id: Uuid,
    pub date_key: DateKey,
    pub started_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub poll_interval_secs: u64,
    pub state: RunState,
    pub poll_count: u32,
    pub result: Option<ContentDescriptor>,
    /// Set when the run completed but the delivery call failed.
    pub delivery_error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl OrchestrationRun {
    pub fn new(
        run_id: Uuid,
        date_key: DateKey,
        started_at: DateTime<Utc>,
        policy: PollPolicy,
    ) -> Self {
        let deadline_at = chrono::Duration::from_std(policy.max_wait)
            .ok()
            .and_then(|max_wait| started_at.checked_add_signed(max_wait))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            run_id,
            date_key,
            started_at,
            deadline_at,
            poll_interval_secs: policy.poll_interval.as_secs(),
            state: RunState::Polling,
            poll_count: 0,
            result: None,
            delivery_error: None,
            finished_at: None,
        }
    }

    /// The wait between lookups; saturates instead of overflowing.
    pub fn poll_interval(&self) -> chrono::Duration {
        i64::try_from(self.poll_interval_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The run as it was at creation: immutable fields kept, progress cleared.
    ///
    /// Replay rebuilds the progress from the step log starting here.
    pub fn restarted(&self) -> Self {
        Self {
            state: RunState::Polling,
            poll_count: 0,
            result: None,
            delivery_error: None,
            finished_at: None,
            ..self.clone()
        }
    }
}

/// Operator-facing failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Expired,
    DeliveryFailed,
}

/// The one error report a failed run sends to the fallback destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub run_id: Uuid,
    pub date_key: DateKey,
    pub kind: FailureKind,
    pub detail: String,
}

impl FailureReport {
    /// Plain-text rendering sent to the operator.
    pub fn message(&self) -> String {
        let headline = match self.kind {
            FailureKind::Expired => format!(
                "Timeout waiting for the content of {} to be released",
                self.date_key
            ),
            FailureKind::DeliveryFailed => {
                format!("Delivery of the content of {} failed", self.date_key)
            }
        };
        format!(
            "StripCourier error: {} (run {}): {}",
            headline, self.run_id, self.detail
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_protocol_relative_locator() {
        assert_eq!(
            normalize_locator("//example.com/strip.png"),
            "https://example.com/strip.png"
        );
    }

    #[test]
    fn test_normalize_keeps_complete_locator() {
        assert_eq!(
            normalize_locator("https://example.com/strip.png"),
            "https://example.com/strip.png"
        );
        assert_eq!(
            normalize_locator("http://example.com/strip.png"),
            "http://example.com/strip.png"
        );
    }

    #[test]
    fn test_normalize_scheme_is_case_insensitive() {
        assert_eq!(
            normalize_locator("HTTPS://example.com/strip.png"),
            "HTTPS://example.com/strip.png"
        );
        assert_eq!(
            normalize_locator("Http://example.com/strip.png"),
            "Http://example.com/strip.png"
        );
        assert_eq!(
            normalize_locator("example.com:8080/strip.png"),
            "https://example.com:8080/strip.png"
        );
    }

    #[test]
    fn test_normalize_bare_host() {
        assert_eq!(
            normalize_locator("example.com/strip.png"),
            "https://example.com/strip.png"
        );
    }

    #[test]
    fn test_descriptor_rejects_empty_locator() {
        assert_eq!(
            ContentDescriptor::new("title", "  "),
            Err(DescriptorError::EmptyLocator)
        );
    }

    #[test]
    fn test_date_key_format() {
        let key: DateKey = "2023-03-07".parse().unwrap();
        assert_eq!(key.to_string(), "2023-03-07");
        assert!("07/03/2023".parse::<DateKey>().is_err());

        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2023-03-07\"");
    }

    #[test]
    fn test_fetch_reply_wire_shape() {
        let found = FetchOutcome::Found(
            ContentDescriptor::new("Monday", "//example.com/a.png").unwrap(),
        );
        let v = serde_json::to_value(FetchReply::from(&found)).unwrap();
        assert_eq!(v["found"], true);
        assert_eq!(v["title"], "Monday");
        assert_eq!(v["locator"], "https://example.com/a.png");
        assert!(v.get("error").is_none());

        let v = serde_json::to_value(FetchReply::from(&FetchOutcome::NotFound)).unwrap();
        assert_eq!(v, serde_json::json!({"found": false}));
    }

    #[test]
    fn test_found_reply_without_locator_is_error() {
        let reply = FetchReply {
            found: true,
            title: Some("t".to_string()),
            locator: None,
            error: None,
        };
        assert!(matches!(FetchOutcome::from(reply), FetchOutcome::Error(_)));
    }

    #[test]
    fn test_delivery_reply_without_detail() {
        let outcome = DeliveryOutcome::from(DeliveryReply {
            success: false,
            error: None,
        });
        assert!(!outcome.is_success());
        assert!(outcome.error().is_some());
    }

    #[test]
    fn test_new_run_deadline() {
        let started = Utc.with_ymd_and_hms(2023, 3, 7, 9, 0, 0).unwrap();
        let run = OrchestrationRun::new(
            Uuid::new_v4(),
            "2023-03-07".parse().unwrap(),
            started,
            PollPolicy::default(),
        );
        assert_eq!(run.deadline_at, started + chrono::Duration::hours(1));
        assert_eq!(run.poll_interval(), chrono::Duration::minutes(5));
        assert_eq!(run.state, RunState::Polling);
        assert_eq!(run.poll_count, 0);
    }

    #[test]
    fn test_oversized_poll_interval_saturates() {
        let mut run = OrchestrationRun::new(
            Uuid::new_v4(),
            "2023-03-07".parse().unwrap(),
            Utc.with_ymd_and_hms(2023, 3, 7, 9, 0, 0).unwrap(),
            PollPolicy::default(),
        );
        run.poll_interval_secs = 100_000_000_000_000_000;
        assert_eq!(run.poll_interval(), chrono::Duration::MAX);
        run.poll_interval_secs = u64::MAX;
        assert_eq!(run.poll_interval(), chrono::Duration::MAX);
    }

    #[test]
    fn test_run_state_round_trips_through_text() {
        for state in [
            RunState::Polling,
            RunState::Delivering,
            RunState::Completed,
            RunState::Expired,
        ] {
            assert_eq!(state.to_string().parse::<RunState>().unwrap(), state);
        }
        assert!(RunState::Completed.is_terminal());
        assert!(!RunState::Delivering.is_terminal());
    }
}
