//! Counters, stats snapshots, and health reports

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConnectionState, StateChange};
use crate::config::ConfigSummary;
use crate::error::ClientError;

/// Monotonic counters kept for the lifetime of a client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Connect calls that started a new attempt (not per retry)
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub retry_attempts: u64,
    pub transcripts_received: u64,
    pub audio_chunks_sent: u64,
}

/// Point-in-time copy of client statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStats {
    #[serde(flatten)]
    pub counters: Counters,
    /// Accumulated connected time, including the current session
    #[serde(with = "duration_ms")]
    pub uptime: Duration,
    pub last_error: Option<ClientError>,
    pub state_history: Vec<StateChange>,
    /// Chunks waiting in the disconnected-audio queue
    pub queued_chunks: usize,
}

/// Result of [`crate::StreamingClient::health_check`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Connected and no error recorded
    pub healthy: bool,
    pub state: ConnectionState,
    pub stats: ClientStats,
    pub config: ConfigSummary,
}

impl HealthReport {
    pub fn new(state: ConnectionState, stats: ClientStats, config: ConfigSummary) -> Self {
        Self {
            healthy: state == ConnectionState::Connected && stats.last_error.is_none(),
            state,
            stats,
            config,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn stats(last_error: Option<ClientError>) -> ClientStats {
        ClientStats {
            counters: Counters::default(),
            uptime: Duration::from_millis(1_500),
            last_error,
            state_history: Vec::new(),
            queued_chunks: 0,
        }
    }

    #[test]
    fn test_healthy_only_when_connected_without_error() {
        let summary = ClientConfig::default().summary();

        assert!(HealthReport::new(ConnectionState::Connected, stats(None), summary.clone()).healthy);
        assert!(!HealthReport::new(ConnectionState::Disconnected, stats(None), summary.clone()).healthy);
        assert!(
            !HealthReport::new(
                ConnectionState::Connected,
                stats(Some(ClientError::connection("flaky"))),
                summary,
            )
            .healthy
        );
    }

    #[test]
    fn test_stats_serialization_flattens_counters() {
        let json = serde_json::to_value(stats(None)).unwrap();
        assert_eq!(json["uptime"], 1_500);
        assert_eq!(json["connection_attempts"], 0);
    }
}
