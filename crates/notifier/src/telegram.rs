//! Telegram delivery through `teloxide`.
//!
//! Content goes out as a photo with the title as an HTML caption; failure
//! reports go out as plain messages to the fallback chat.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::{Captures, Regex};
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, ParseMode, Recipient};
use thiserror::Error;

use courier_common::types::{ContentDescriptor, DeliveryOutcome, FailureReport};

use crate::Notifier;

/// Suffix appended to the photo address so the Bot API treats it as an animation-capable image.
const PHOTO_SUFFIX: &str = ".gif";

/// An entity Telegram's HTML mode accepts, or a bare character it rejects.
static CAPTION_ESCAPES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:lt|gt|amp|quot|#[0-9]+|#[xX][0-9a-fA-F]+);|[&<>]")
        .expect("invalid caption escape pattern")
});

#[derive(Debug, Error)]
enum NotifyError {
    #[error("{method} failed: {source}")]
    Request {
        method: &'static str,
        source: teloxide::RequestError,
    },

    #[error("{method} timed out after {timeout:?}")]
    Timeout {
        method: &'static str,
        timeout: Duration,
    },

    #[error("invalid photo address {locator}: {reason}")]
    Locator { locator: String, reason: String },
}

/// Notifier backed by a Telegram bot.
pub struct TelegramNotifier {
    bot: Bot,
    notify_chat: Recipient,
    fallback_chat: Recipient,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(
        bot_token: impl Into<String>,
        notify_chat_id: &str,
        fallback_chat_id: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            bot: Bot::with_client(bot_token, client),
            notify_chat: recipient(notify_chat_id),
            fallback_chat: recipient(fallback_chat_id),
            timeout,
        })
    }

    /// Point at a different Bot API host (self-hosted API server, tests).
    pub fn with_api_url(mut self, api_url: Url) -> Self {
        self.bot = self.bot.set_api_url(api_url);
        self
    }

    /// Send deliveries to the fallback chat instead of the notify chat.
    ///
    /// Used on staging deployments so content never reaches the real audience.
    pub fn redirect_to_fallback(mut self, redirect: bool) -> Self {
        if redirect {
            tracing::warn!("Deliveries redirected to the fallback chat");
            self.notify_chat = self.fallback_chat.clone();
        }
        self
    }

    async fn bounded<F, T>(&self, method: &'static str, request: F) -> Result<(), NotifyError>
    where
        F: std::future::Future<Output = Result<T, teloxide::RequestError>>,
    {
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| NotifyError::Timeout {
                method,
                timeout: self.timeout,
            })?
            .map(|_| ())
            .map_err(|source| NotifyError::Request { method, source })
    }

    async fn send_photo(&self, content: &ContentDescriptor) -> Result<(), NotifyError> {
        let photo = photo_url(content)?;
        let request = self
            .bot
            .send_photo(self.notify_chat.clone(), InputFile::url(photo))
            .caption(caption(&content.title))
            .parse_mode(ParseMode::Html);
        self.bounded("sendPhoto", request.send()).await
    }

    async fn send_report(&self, report: &FailureReport) -> Result<(), NotifyError> {
        let request = self
            .bot
            .send_message(self.fallback_chat.clone(), report.message());
        self.bounded("sendMessage", request.send()).await
    }
}

/// Numeric ids address a chat directly; anything else is a channel username.
fn recipient(chat_id: &str) -> Recipient {
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.to_string()),
    }
}

fn photo_url(content: &ContentDescriptor) -> Result<Url, NotifyError> {
    let locator = format!("{}{}", content.locator, PHOTO_SUFFIX);
    Url::parse(&locator).map_err(|e| NotifyError::Locator {
        reason: e.to_string(),
        locator,
    })
}

/// Titles arrive as page text: entities already escaped are kept, bare
/// `&`, `<` and `>` are escaped so the HTML caption always parses.
fn caption(title: &str) -> String {
    CAPTION_ESCAPES
        .replace_all(title, |caps: &Captures| match &caps[0] {
            "&" => "&amp;".to_string(),
            "<" => "&lt;".to_string(),
            ">" => "&gt;".to_string(),
            entity => entity.to_string(),
        })
        .into_owned()
}

fn outcome(result: Result<(), NotifyError>) -> DeliveryOutcome {
    match result {
        Ok(()) => DeliveryOutcome::Success,
        Err(e) => DeliveryOutcome::Error(e.to_string()),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, content: &ContentDescriptor) -> DeliveryOutcome {
        outcome(self.send_photo(content).await)
    }

    async fn report_failure(&self, report: &FailureReport) -> DeliveryOutcome {
        outcome(self.send_report(report).await)
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
