//! Abstract transport capability
//!
//! The client never talks to a vendor SDK directly. It sequences calls on a
//! [`Transport`] and reacts to the notifications the transport pushes through
//! a [`TransportEventSender`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ClientError;

/// One transcription result delivered by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// The transcribed text
    pub text: String,
    /// Whether this is a final (not interim) result
    pub is_final: bool,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,
    /// Speaker label when speaker labelling is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Offset of the first word in the audio stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_start_ms: Option<u64>,
    /// Offset of the last word in the audio stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_end_ms: Option<u64>,
}

impl Transcript {
    pub fn new(text: impl Into<String>, is_final: bool, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_final,
            confidence: confidence.clamp(0.0, 1.0),
            speaker: None,
            audio_start_ms: None,
            audio_end_ms: None,
        }
    }
}

/// Failures reported by a transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Structured status from the service (HTTP-style code)
    #[error("transport returned status {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Already classified by the transport; passed through unchanged
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Free-form failure text
    #[error("{0}")]
    Message(String),
}

impl From<String> for TransportError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for TransportError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

/// Notifications a transport session pushes to the client
#[derive(Debug)]
pub enum TransportEvent {
    /// Session negotiated; carries the service-assigned session id
    Open { session_id: String },
    Transcript(Transcript),
    Error(TransportError),
    /// Session ended, by either side
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// Handle a transport uses to notify the client about one session
///
/// A fresh sender is handed to every [`Transport::connect`] call. Once the
/// client is done with that session the receiving side is dropped and the
/// helpers below start returning `false`.
#[derive(Debug, Clone)]
pub struct TransportEventSender {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportEventSender {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn open(&self, session_id: impl Into<String>) -> bool {
        self.send(TransportEvent::Open {
            session_id: session_id.into(),
        })
    }

    pub fn transcript(&self, transcript: Transcript) -> bool {
        self.send(TransportEvent::Transcript(transcript))
    }

    pub fn error(&self, error: impl Into<TransportError>) -> bool {
        self.send(TransportEvent::Error(error.into()))
    }

    pub fn closed(&self, code: Option<u16>, reason: Option<String>) -> bool {
        self.send(TransportEvent::Closed { code, reason })
    }

    /// Whether the client is still listening on this session
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Capability surface of a streaming transcription session
///
/// Implementations wrap a concrete SDK or socket. The client guarantees that it
/// never calls `connect` while a previous session is still open.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin negotiating a session
    ///
    /// Returning `Ok` only means negotiation started; the session counts as
    /// established once [`TransportEventSender::open`] is delivered. Returning
    /// `Err` fails the attempt immediately.
    async fn connect(&self, events: TransportEventSender) -> Result<(), TransportError>;

    /// Forward one chunk of encoded audio
    async fn send_audio(&self, chunk: Vec<u8>) -> Result<(), TransportError>;

    /// Close the current session, if any
    async fn close(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_confidence_clamping() {
        assert_eq!(Transcript::new("hi", true, 1.7).confidence, 1.0);
        assert_eq!(Transcript::new("hi", true, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_sender_reports_dropped_receiver() {
        let (sender, rx) = TransportEventSender::channel();
        assert!(sender.open("abc"));
        drop(rx);
        assert!(sender.is_closed());
        assert!(!sender.closed(Some(1000), None));
    }

    #[test]
    fn test_transcript_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Transcript::new("hello", false, 0.5)).unwrap();
        assert!(json.contains("\"text\":\"hello\""));
        assert!(!json.contains("speaker"));
    }
}
