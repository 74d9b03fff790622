//! Connection state tracking
//!
//! Records every transition in a bounded history and accumulates the time
//! spent connected.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;

/// Number of transitions kept in the history
pub const STATE_HISTORY_LIMIT: usize = 100;

/// Lifecycle states of the streaming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session and no attempt in progress
    Disconnected,
    /// First establish attempt of a connect call
    Connecting,
    /// Session open; audio flows straight to the transport
    Connected,
    /// Waiting out backoff or retrying after a failed attempt
    Reconnecting,
    /// Last connect call failed; only a new connect leaves this state
    Error,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        }
    }

    /// A connect call is currently running
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Reconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub at: SystemTime,
}

/// Owns the current state, its history, and connected-time accounting
#[derive(Debug)]
pub struct StateMachine {
    state: ConnectionState,
    /// Time when the current state was entered
    state_entered_at: Instant,
    history: VecDeque<StateChange>,
    /// Connected time from intervals that have already ended
    accumulated_uptime: Duration,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(STATE_HISTORY_LIMIT),
            accumulated_uptime: Duration::ZERO,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `new_state`, returning the recorded change
    ///
    /// Returns `None` when already in `new_state`; nothing is recorded then.
    pub fn transition_to(&mut self, new_state: ConnectionState) -> Option<StateChange> {
        let old_state = self.state;
        if old_state == new_state {
            return None;
        }

        let duration = self.state_entered_at.elapsed();
        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration.as_millis() as u64,
            "state transition"
        );

        if old_state == ConnectionState::Connected {
            self.accumulated_uptime += duration;
        }

        let change = StateChange {
            from: old_state,
            to: new_state,
            at: SystemTime::now(),
        };
        if self.history.len() == STATE_HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(change.clone());

        self.state = new_state;
        self.state_entered_at = Instant::now();

        Some(change)
    }

    /// Total connected time, including the interval in progress
    pub fn uptime(&self) -> Duration {
        if self.state == ConnectionState::Connected {
            self.accumulated_uptime + self.state_entered_at.elapsed()
        } else {
            self.accumulated_uptime
        }
    }

    pub fn history(&self) -> Vec<StateChange> {
        self.history.iter().cloned().collect()
    }
}
