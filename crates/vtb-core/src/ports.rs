//! Ports (traits) implemented by adapters: recognition, persistence, analytics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    analytics::AnalyticsRecord,
    domain::{ChatId, DonationId, UserId},
    language::LanguageCode,
    Result,
};

/// Context passed to recognition providers for logging / provider hints.
#[derive(Clone, Debug)]
pub struct RecognitionMeta {
    pub file_id: String,
    pub duration_secs: i64,
    /// As reported by the platform; `None` for video notes.
    pub mime_type: Option<String>,
    pub log_prefix: String,
}

/// Speech-to-text capability. The core is provider-agnostic.
#[async_trait]
pub trait VoiceConverter: Send + Sync {
    async fn transform_to_text(
        &self,
        file_link: &str,
        is_video: bool,
        lang: LanguageCode,
        meta: &RecognitionMeta,
    ) -> Result<String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DonationStatus {
    Initialized,
    Pending,
    Received,
    Canceled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub ends_at: DateTime<Utc>,
    pub is_trial: bool,
    pub canceled: bool,
}

impl Subscription {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.canceled && self.ends_at > now
    }
}

/// Key-indexed upsert store. Every write is idempotent per chat/entity id.
#[async_trait]
pub trait StatStore: Send + Sync {
    async fn get_language(&self, chat_id: ChatId) -> Result<Option<LanguageCode>>;
    async fn update_language(&self, chat_id: ChatId, lang: LanguageCode) -> Result<()>;

    /// Bump the usage counter and accumulate recognised seconds.
    async fn increment_usage(&self, chat_id: ChatId, name: &str, duration_secs: i64)
        -> Result<()>;

    async fn is_chat_ignored(&self, chat_id: ChatId) -> Result<bool>;

    async fn create_donation(&self, chat_id: ChatId, price: u32) -> Result<DonationId>;
    async fn update_donation(&self, id: DonationId, status: DonationStatus) -> Result<()>;

    async fn get_subscription(&self, user_id: UserId) -> Result<Option<Subscription>>;
    async fn has_had_trial(&self, user_id: UserId) -> Result<bool>;
    async fn create_subscription(&self, sub: Subscription) -> Result<()>;
    async fn cancel_subscription(&self, user_id: UserId) -> Result<()>;

    /// Liveness row for the replica handoff scheme.
    async fn update_node_state(&self, self_url: &str, is_active: bool, version: &str)
        -> Result<()>;
}

/// Fire-and-forget analytics transport. Must not fail the caller.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn collect(&self, record: AnalyticsRecord);
}
