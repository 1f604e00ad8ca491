/// A failed Bot API call, reduced to what the classifier is allowed to look at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformFailure {
    /// HTTP-ish error code reported by the platform (`None` for transport failures).
    pub status: Option<u16>,
    pub description: String,
    /// Seconds to wait before retrying, when the platform provided one.
    pub retry_after: Option<u64>,
}

impl PlatformFailure {
    pub fn new(status: Option<u16>, description: impl Into<String>) -> Self {
        Self {
            status,
            description: description.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }
}

impl std::fmt::Display for PlatformFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "{code} {}", self.description),
            None => write!(f, "{}", self.description),
        }
    }
}

/// Core error type.
///
/// Adapter crates should map their specific errors into this type so the
/// dispatcher can handle failures consistently (user-facing message vs
/// silent log).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("telegram error: {0}")]
    Platform(PlatformFailure),

    #[error("recognition error: {0}")]
    Recognition(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("payload error: {0}")]
    Payload(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn platform(&self) -> Option<&PlatformFailure> {
        match self {
            Error::Platform(p) => Some(p),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
