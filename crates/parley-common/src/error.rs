use std::fmt;

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("upstream error: {0}")]
    Upstream(UpstreamError),

    #[error("all {attempts} credential(s) exhausted, last error: {last}")]
    AllCredentialsExhausted { attempts: usize, last: UpstreamError },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether rotating to another upstream credential may succeed where this failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Upstream(upstream) => upstream.is_retryable(),
            _ => false,
        }
    }
}

impl From<UpstreamError> for Error {
    fn from(err: UpstreamError) -> Self {
        Error::Upstream(err)
    }
}

/// Classification of a failed call to the generative backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    RateLimited,
    QuotaExhausted,
    Unavailable,
    InvalidRequest,
    Unauthorized,
    MalformedResponse,
    Other,
}

impl UpstreamErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            UpstreamErrorKind::RateLimited
                | UpstreamErrorKind::QuotaExhausted
                | UpstreamErrorKind::Unavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamErrorKind::RateLimited => "rate_limited",
            UpstreamErrorKind::QuotaExhausted => "quota_exhausted",
            UpstreamErrorKind::Unavailable => "unavailable",
            UpstreamErrorKind::InvalidRequest => "invalid_request",
            UpstreamErrorKind::Unauthorized => "unauthorized",
            UpstreamErrorKind::MalformedResponse => "malformed_response",
            UpstreamErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure reported by an LLM provider.
///
/// Providers classify failures at the protocol boundary so callers never
/// inspect message text to decide whether a retry is worthwhile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status={}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for UpstreamError {}
