//! stt-link: resilient connection management for streaming transcription
//!
//! Wraps a [`Transport`] to a real-time speech-to-text service with:
//! - An explicit connection state machine with bounded history
//! - Exponential backoff with jitter, short-circuited on rate limits
//! - A bounded FIFO that holds audio while the session is down
//! - Classification of transport failures into retry decisions
//! - An event hub for state changes, transcripts, and errors
//! - Counters and a health report for monitoring
//!
//! The wire protocol lives behind the [`Transport`] trait; this crate never
//! opens sockets itself.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod queue;
pub mod retry;
pub mod state;
pub mod transport;

pub use client::StreamingClient;
pub use config::{ClientConfig, ConfigSummary, ConfigUpdate};
pub use error::{ClientError, ErrorCode};
pub use events::{ClientEvent, EventKind, SubscriptionId};
pub use queue::AudioQueue;
pub use retry::RetryPolicy;
pub use state::{ClientStats, ConnectionState, Counters, HealthReport, StateChange};
pub use transport::{Transcript, Transport, TransportError, TransportEvent, TransportEventSender};
