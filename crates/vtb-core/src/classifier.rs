//! Maps platform API failures to retry / suppress / notify outcomes.

use crate::errors::{Error, PlatformFailure};

const BLOCKED_BY_USER: &str = "bot was blocked by the user";
const NOT_MODIFIED: &str = "message is not modified";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Platform asked us to slow down. Nothing here retries automatically.
    RateLimited { retry_after: Option<u64> },
    /// The user blocked the bot; warn only, never reply.
    BlockedByRecipient,
    /// Editing a message with identical content; benign no-op.
    NotModified,
    Generic,
}

impl ErrorKind {
    /// Whether the failure deserves a generic user-facing reply (private chats only).
    pub fn should_notify(self, is_group: bool) -> bool {
        !is_group && self == ErrorKind::Generic
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimited { .. } => "rate_limited",
            ErrorKind::BlockedByRecipient => "blocked_by_recipient",
            ErrorKind::NotModified => "not_modified",
            ErrorKind::Generic => "generic",
        }
    }
}

pub fn classify(err: &Error) -> ErrorKind {
    match err.platform() {
        Some(p) => classify_platform(p),
        None => ErrorKind::Generic,
    }
}

pub fn classify_platform(p: &PlatformFailure) -> ErrorKind {
    match p.status {
        Some(429) => ErrorKind::RateLimited {
            retry_after: p.retry_after,
        },
        Some(403) if p.description.contains(BLOCKED_BY_USER) => ErrorKind::BlockedByRecipient,
        Some(400) if p.description.contains(NOT_MODIFIED) => ErrorKind::NotModified,
        _ => ErrorKind::Generic,
    }
}

/// Log a failure at the level its classification calls for.
pub fn log_failure(err: &Error, context: &str, prefix: &crate::prefix::MessagePrefix) -> ErrorKind {
    let kind = classify(err);
    match kind {
        ErrorKind::BlockedByRecipient => {
            tracing::warn!(%prefix, "{context}: bot was blocked by the user")
        }
        ErrorKind::NotModified => tracing::debug!(%prefix, "{context}: message not modified"),
        ErrorKind::RateLimited { retry_after } => {
            tracing::warn!(%prefix, ?retry_after, "{context}: rate limited: {err}")
        }
        ErrorKind::Generic => tracing::error!(%prefix, "{context}: {err}"),
    }
    kind
}
