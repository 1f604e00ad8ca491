//! Per-update analytics summary and the log-backed sink.

use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;

use crate::{domain::ChatId, ports::AnalyticsSink};

pub const NO_CONTENT: &str = "no content";

/// Accumulates what happened while one update was handled.
///
/// Actions tag it through `&self`; the dispatcher flushes it once.
#[derive(Debug)]
pub struct AnalyticsData {
    chat_id: ChatId,
    lang: Option<String>,
    started: Instant,
    inner: Mutex<Tags>,
}

#[derive(Clone, Debug, Default)]
struct Tags {
    command: Option<String>,
    events: Vec<String>,
    errors: Vec<String>,
}

/// Flushed form of `AnalyticsData`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyticsRecord {
    pub chat_id: ChatId,
    pub lang: Option<String>,
    pub command: String,
    pub events: Vec<String>,
    pub errors: Vec<String>,
    pub elapsed_ms: u128,
}

impl AnalyticsData {
    pub fn new(chat_id: ChatId, lang: Option<String>) -> Self {
        Self {
            chat_id,
            lang,
            started: Instant::now(),
            inner: Mutex::new(Tags::default()),
        }
    }

    pub fn set_command(&self, command: &str) {
        if let Ok(mut tags) = self.inner.lock() {
            tags.command = Some(command.to_string());
        }
    }

    pub fn add_event(&self, event: &str) {
        if let Ok(mut tags) = self.inner.lock() {
            tags.events.push(event.to_string());
        }
    }

    pub fn add_error(&self, error: &str) {
        if let Ok(mut tags) = self.inner.lock() {
            tags.errors.push(error.to_string());
        }
    }

    pub fn record(&self) -> AnalyticsRecord {
        let tags = self
            .inner
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default();
        AnalyticsRecord {
            chat_id: self.chat_id,
            lang: self.lang.clone(),
            command: tags.command.unwrap_or_else(|| NO_CONTENT.to_string()),
            events: tags.events,
            errors: tags.errors,
            elapsed_ms: self.started.elapsed().as_millis(),
        }
    }
}

/// Writes analytics records to the log. Stand-in for a remote transport.
#[derive(Default)]
pub struct LogAnalyticsSink;

#[async_trait]
impl AnalyticsSink for LogAnalyticsSink {
    async fn collect(&self, record: AnalyticsRecord) {
        tracing::info!(
            target: "vtb::analytics",
            chat_id = record.chat_id.0,
            command = %record.command,
            elapsed_ms = record.elapsed_ms as u64,
            events = ?record.events,
            errors = ?record.errors,
            "analytics"
        );
    }
}
