//! Events emitted by the streaming client
//!
//! Each [`ClientEvent`] belongs to one named [`EventKind`]; subscribers register
//! per kind on the [`EventHub`].

mod hub;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::state::ConnectionState;
use crate::transport::Transcript;

pub use hub::{EventHandler, EventHub, SubscriptionId};

/// Named event channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    ConnectionState,
    Transcript,
    Error,
    SessionBegins,
    SessionTerminated,
    RetryAttempt,
    RateLimit,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::ConnectionState,
        EventKind::Transcript,
        EventKind::Error,
        EventKind::SessionBegins,
        EventKind::SessionTerminated,
        EventKind::RetryAttempt,
        EventKind::RateLimit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ConnectionState => "connection-state",
            EventKind::Transcript => "transcript",
            EventKind::Error => "error",
            EventKind::SessionBegins => "session-begins",
            EventKind::SessionTerminated => "session-terminated",
            EventKind::RetryAttempt => "retry-attempt",
            EventKind::RateLimit => "rate-limit",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event kind: {s}"))
    }
}

/// Notifications published by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// The connection moved to a new state
    ConnectionState {
        state: ConnectionState,
        previous: ConnectionState,
    },

    /// A transcript arrived from the service
    Transcript { transcript: Transcript },

    /// A failure was classified and surfaced
    Error { error: ClientError },

    /// A session was established
    SessionBegins { session_id: String },

    /// The service ended the session while connected
    SessionTerminated {
        code: Option<u16>,
        reason: Option<String>,
    },

    /// A retry is about to run after `delay_ms`
    RetryAttempt { attempt: u32, delay_ms: u64 },

    /// The service throttled us and the connect call was abandoned
    RateLimit { retry_after_ms: u64 },
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::ConnectionState { .. } => EventKind::ConnectionState,
            ClientEvent::Transcript { .. } => EventKind::Transcript,
            ClientEvent::Error { .. } => EventKind::Error,
            ClientEvent::SessionBegins { .. } => EventKind::SessionBegins,
            ClientEvent::SessionTerminated { .. } => EventKind::SessionTerminated,
            ClientEvent::RetryAttempt { .. } => EventKind::RetryAttempt,
            ClientEvent::RateLimit { .. } => EventKind::RateLimit,
        }
    }
}

impl std::fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientEvent::ConnectionState { state, previous } => {
                write!(f, "CONNECTION_STATE ({previous} -> {state})")
            }
            ClientEvent::Transcript { transcript } => {
                write!(
                    f,
                    "TRANSCRIPT ({} chars, final={})",
                    transcript.text.len(),
                    transcript.is_final
                )
            }
            ClientEvent::Error { error } => write!(f, "ERROR ({})", error.code()),
            ClientEvent::SessionBegins { session_id } => write!(f, "SESSION_BEGINS ({session_id})"),
            ClientEvent::SessionTerminated { code, .. } => match code {
                Some(code) => write!(f, "SESSION_TERMINATED ({code})"),
                None => write!(f, "SESSION_TERMINATED"),
            },
            ClientEvent::RetryAttempt { attempt, delay_ms } => {
                write!(f, "RETRY_ATTEMPT (#{attempt} in {delay_ms}ms)")
            }
            ClientEvent::RateLimit { retry_after_ms } => {
                write!(f, "RATE_LIMIT ({retry_after_ms}ms)")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ClientEvent::RetryAttempt {
            attempt: 2,
            delay_ms: 1_500,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"retry-attempt\""));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"session-begins","session_id":"abc-123"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ClientEvent::SessionBegins {
                session_id: "abc-123".to_string()
            }
        );
        assert_eq!(event.kind(), EventKind::SessionBegins);
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert!("bogus".parse::<EventKind>().is_err());
    }
}
