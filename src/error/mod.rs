//! Client error taxonomy
//!
//! Every failure the client surfaces is a [`ClientError`]. Transport failures
//! are normalized into it by [`classify`].

mod classify;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use classify::classify;

/// Stable machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConnectionError,
    RateLimitError,
    AuthError,
    UnknownError,
    NotConnected,
    QueueFull,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::RateLimitError => "RATE_LIMIT_ERROR",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::QueueFull => "QUEUE_FULL",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the streaming client
///
/// Values are created once per failure and never mutated. `Clone` lets a single
/// connect outcome be handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientError {
    /// Network or session-level failure; always retryable
    #[error("connection error: {message}")]
    Connection {
        message: String,
        status_code: Option<u16>,
    },

    /// The service is throttling us; retryable, but ends the current connect call
    #[error("rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// Credentials were rejected; never retried
    #[error("authentication failed: {message}")]
    Auth {
        message: String,
        /// Observed status (401 or 403); `None` when inferred from text
        status_code: Option<u16>,
    },

    /// Anything that does not fit the categories above
    #[error("{message}")]
    Client {
        message: String,
        code: ErrorCode,
        status_code: Option<u16>,
        retryable: bool,
    },
}

impl ClientError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn rate_limit(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            status_code: None,
        }
    }

    /// Unclassified failure, retryable by default
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
            code: ErrorCode::UnknownError,
            status_code: None,
            retryable: true,
        }
    }

    pub fn not_connected() -> Self {
        Self::Client {
            message: "not connected and audio batching is disabled".to_string(),
            code: ErrorCode::NotConnected,
            status_code: None,
            retryable: false,
        }
    }

    pub fn queue_full(capacity: usize) -> Self {
        Self::Client {
            message: format!("not connected and audio queue is full ({capacity} chunks)"),
            code: ErrorCode::QueueFull,
            status_code: None,
            retryable: false,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
            code: ErrorCode::Cancelled,
            status_code: None,
            retryable: false,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Connection { .. } => ErrorCode::ConnectionError,
            ClientError::RateLimit { .. } => ErrorCode::RateLimitError,
            ClientError::Auth { .. } => ErrorCode::AuthError,
            ClientError::Client { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ClientError::Connection { message, .. }
            | ClientError::RateLimit { message, .. }
            | ClientError::Auth { message, .. }
            | ClientError::Client { message, .. } => message,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Connection { status_code, .. } => *status_code,
            ClientError::RateLimit { .. } => Some(429),
            ClientError::Auth { status_code, .. } => status_code.or(Some(401)),
            ClientError::Client { status_code, .. } => *status_code,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connection { .. } | ClientError::RateLimit { .. } => true,
            ClientError::Auth { .. } => false,
            ClientError::Client { retryable, .. } => *retryable,
        }
    }

    /// Cooldown advised by the service, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::RateLimit { retry_after_ms, .. } => {
                retry_after_ms.map(Duration::from_millis)
            }
            _ => None,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ClientError::RateLimit { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        self.code() == ErrorCode::Cancelled
    }
}
