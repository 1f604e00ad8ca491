//! Correlation ids linking an outbound interactive flow to later callbacks.

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::domain::ChatId;

const ID_LEN: usize = 10;
const ALPHABET: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opaque short token. Not display text; only ever echoed back or logged.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate(chat_id: ChatId) -> Self {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(nanos.to_le_bytes());
        hasher.update(seq.to_le_bytes());
        hasher.update(chat_id.0.to_le_bytes());
        let digest = hasher.finalize();

        let id = digest
            .iter()
            .take(ID_LEN)
            .map(|b| ALPHABET[(b & 63) as usize] as char)
            .collect();
        Self(id)
    }

    /// Rehydrate an id received from a callback payload.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub(crate) fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// `{chat_id, id}` pair carried through an update's handling and its log lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagePrefix {
    pub chat_id: ChatId,
    pub id: CorrelationId,
}

impl MessagePrefix {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            id: CorrelationId::generate(chat_id),
        }
    }

    /// Continue a flow started earlier (the id comes from a button payload).
    pub fn resume(chat_id: ChatId, id: CorrelationId) -> Self {
        Self { chat_id, id }
    }
}

impl std::fmt::Display for MessagePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[Id={}] [ChatId={}]", self.id, self.chat_id)
    }
}
