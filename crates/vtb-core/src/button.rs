//! Compact payloads for inline button callbacks.
//!
//! Telegram caps `callback_data` at 64 bytes, so the serialized form uses
//! single-character keys: `{"t":"l","v":"ru-RU","i":"k3JdX9aQ0b"}`.

use serde::{Deserialize, Serialize};

use crate::{errors::Error, prefix::CorrelationId, Result};

pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonKind {
    Donation,
    Language,
    Subscription,
    Unknown,
}

impl ButtonKind {
    fn as_code(self) -> &'static str {
        match self {
            ButtonKind::Donation => "d",
            ButtonKind::Language => "l",
            ButtonKind::Subscription => "s",
            ButtonKind::Unknown => "",
        }
    }

    fn from_code(code: &str) -> Self {
        match code {
            "d" => ButtonKind::Donation,
            "l" => ButtonKind::Language,
            "s" => ButtonKind::Subscription,
            _ => ButtonKind::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ButtonKind::Donation => "donation",
            ButtonKind::Language => "language",
            ButtonKind::Subscription => "subscription",
            ButtonKind::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonState {
    pub kind: ButtonKind,
    pub value: String,
    pub correlation_id: CorrelationId,
}

#[derive(Serialize)]
struct WireOut<'a> {
    t: &'a str,
    v: &'a str,
    i: &'a str,
}

#[derive(Deserialize)]
struct WireIn {
    t: String,
    v: String,
    i: String,
}

impl ButtonState {
    pub fn new(kind: ButtonKind, value: impl Into<String>, correlation_id: CorrelationId) -> Self {
        Self {
            kind,
            value: value.into(),
            correlation_id,
        }
    }

    pub fn unknown() -> Self {
        Self {
            kind: ButtonKind::Unknown,
            value: String::new(),
            correlation_id: CorrelationId::empty(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == ButtonKind::Unknown
    }

    pub fn encode(&self) -> Result<String> {
        if self.is_unknown() {
            return Err(Error::Payload("cannot encode an unknown button".to_string()));
        }
        let data = serde_json::to_string(&WireOut {
            t: self.kind.as_code(),
            v: &self.value,
            i: self.correlation_id.as_str(),
        })?;
        if data.len() > MAX_CALLBACK_DATA_BYTES {
            return Err(Error::Payload(format!(
                "callback data is {} bytes, limit is {MAX_CALLBACK_DATA_BYTES}",
                data.len()
            )));
        }
        Ok(data)
    }

    /// Never fails: stale buttons from older deploys decode to `unknown`.
    pub fn decode(data: &str) -> Self {
        let Ok(wire) = serde_json::from_str::<WireIn>(data) else {
            return Self::unknown();
        };
        let kind = ButtonKind::from_code(&wire.t);
        if kind == ButtonKind::Unknown {
            return Self::unknown();
        }
        Self {
            kind,
            value: wire.v,
            correlation_id: CorrelationId::from_raw(wire.i),
        }
    }
}
