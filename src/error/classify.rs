//! Normalization of transport failures into the client taxonomy
//!
//! Structured signals (HTTP-style status codes, `io::ErrorKind`) are trusted
//! first. Scanning message text is a last resort for transports that only
//! report free-form strings, and it can misclassify: a transcript-ish message
//! that happens to mention "network" will be treated as a connection error.

use std::io;

use tracing::debug;

use super::ClientError;
use crate::transport::TransportError;

const RATE_LIMIT_MARKERS: &[&str] = &["429", "rate limit", "rate-limit", "too many requests", "throttl"];

const AUTH_MARKERS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "authentication",
    "invalid api key",
];

const NETWORK_MARKERS: &[&str] = &[
    "network",
    "connect",
    "socket",
    "timeout",
    "timed out",
    "econnrefused",
    "econnreset",
    "enotfound",
    "unreachable",
    "dns",
];

/// Map any transport failure onto a [`ClientError`]
pub fn classify(error: TransportError) -> ClientError {
    let classified = match error {
        TransportError::Client(inner) => inner,
        TransportError::Status {
            status,
            message,
            retry_after,
        } => from_status(status, message, retry_after),
        TransportError::Io(err) => from_io(err),
        TransportError::Message(message) => from_message(message),
    };

    debug!(code = %classified.code(), "classified transport error");
    classified
}

fn from_status(
    status: u16,
    message: String,
    retry_after: Option<std::time::Duration>,
) -> ClientError {
    match status {
        429 => ClientError::rate_limit(message, retry_after),
        401 | 403 => ClientError::Auth {
            message,
            status_code: Some(status),
        },
        408 | 500..=599 => ClientError::Connection {
            message,
            status_code: Some(status),
        },
        _ => ClientError::Client {
            message,
            code: super::ErrorCode::UnknownError,
            status_code: Some(status),
            retryable: true,
        },
    }
}

fn from_io(err: io::Error) -> ClientError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::TimedOut
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::AddrNotAvailable => ClientError::connection(err.to_string()),
        _ => from_message(err.to_string()),
    }
}

fn from_message(message: String) -> ClientError {
    let lowered = message.to_lowercase();
    let mentions = |markers: &[&str]| markers.iter().any(|m| lowered.contains(m));

    if mentions(RATE_LIMIT_MARKERS) {
        ClientError::rate_limit(message, None)
    } else if mentions(AUTH_MARKERS) {
        ClientError::auth(message)
    } else if mentions(NETWORK_MARKERS) {
        ClientError::connection(message)
    } else {
        ClientError::unknown(message)
    }
}
