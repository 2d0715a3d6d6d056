use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::types::PollPolicy;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string (durable run store)
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Redis connection string (trigger start guard)
    pub redis_url: String,

    /// Page that publishes the dated content
    pub content_source_url: String,

    /// Upper bound for one content lookup, in seconds (default: 30)
    pub fetch_timeout_secs: u64,

    /// Upper bound for one delivery call, in seconds (default: 30)
    pub delivery_timeout_secs: u64,

    /// Wait between unsuccessful lookups, in seconds (default: 300)
    pub poll_interval_secs: u64,

    /// How long a run keeps looking before it expires, in seconds (default: 3600)
    pub max_wait_secs: u64,

    /// Six-field cron expression for the daily trigger (default: `0 0 9 * * *`)
    pub trigger_cron: String,

    /// Offset from UTC, in minutes, for the trigger schedule and the date key (default: 0)
    pub trigger_utc_offset_minutes: i32,

    /// Fire once immediately when the scheduler starts
    pub run_on_startup: bool,

    /// Telegram bot token used to authenticate outbound calls
    pub telegram_bot_token: String,

    /// Chat that receives the daily content
    pub notify_chat_id: String,

    /// Chat that receives operator failure reports
    pub fallback_chat_id: String,

    /// Send deliveries to the fallback chat instead of the notify chat (staging)
    pub redirect_to_fallback: bool,

    /// In-process resumption attempts after an unexpected run error (default: 5)
    pub resume_max_attempts: u32,

    /// Delay between resumption attempts, in seconds (default: 30)
    pub resume_backoff_secs: u64,

    /// Status API listen port (default: 3000)
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            content_source_url: std::env::var("CONTENT_SOURCE_URL")
                .unwrap_or_else(|_| "http://dilbert.com".to_string()),
            fetch_timeout_secs: parse_var("FETCH_TIMEOUT_SECS", "30")?,
            delivery_timeout_secs: parse_var("DELIVERY_TIMEOUT_SECS", "30")?,
            poll_interval_secs: parse_window("POLL_INTERVAL_SECS", "300")?,
            max_wait_secs: parse_window("MAX_WAIT_SECS", "3600")?,
            trigger_cron: std::env::var("TRIGGER_CRON")
                .unwrap_or_else(|_| "0 0 9 * * *".to_string()),
            trigger_utc_offset_minutes: parse_var("TRIGGER_UTC_OFFSET_MINUTES", "0")?,
            run_on_startup: parse_var("RUN_ON_STARTUP", "false")?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").map_err(|_| {
                anyhow::anyhow!("TELEGRAM_BOT_TOKEN environment variable is required")
            })?,
            notify_chat_id: std::env::var("NOTIFY_CHAT_ID")
                .map_err(|_| anyhow::anyhow!("NOTIFY_CHAT_ID environment variable is required"))?,
            fallback_chat_id: std::env::var("FALLBACK_CHAT_ID").map_err(|_| {
                anyhow::anyhow!("FALLBACK_CHAT_ID environment variable is required")
            })?,
            redirect_to_fallback: parse_var("REDIRECT_TO_FALLBACK", "false")?,
            resume_max_attempts: parse_var("RESUME_MAX_ATTEMPTS", "5")?,
            resume_backoff_secs: parse_var("RESUME_BACKOFF_SECS", "30")?,
            api_port: parse_var("API_PORT", "3000")?,
        })
    }

    /// Poll cadence and deadline window handed to every new run.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }

    /// Timezone the trigger schedule and date keys are expressed in.
    pub fn trigger_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.trigger_utc_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!(
                "TRIGGER_UTC_OFFSET_MINUTES out of range: {}",
                self.trigger_utc_offset_minutes
            )
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("{} has an invalid value", name))
}

/// Longest accepted poll interval or wait window.
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

/// A polling duration in seconds: at least 1, at most [`MAX_WINDOW_SECS`].
fn parse_window(name: &str, default: &str) -> anyhow::Result<u64> {
    let secs: u64 = parse_var(name, default)?;
    check_window(name, secs)
}

fn check_window(name: &str, secs: u64) -> anyhow::Result<u64> {
    if secs == 0 || secs > MAX_WINDOW_SECS {
        anyhow::bail!(
            "{} must be between 1 and {} seconds, got {}",
            name,
            MAX_WINDOW_SECS,
            secs
        );
    }
    Ok(secs)
}
