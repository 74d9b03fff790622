//! Connection state machine and statistics
//!
//! Five states: Disconnected, Connecting, Connected, Reconnecting, Error.
//! Every transition is kept in a bounded history that feeds the stats snapshot.

mod machine;
mod stats;

pub use machine::{ConnectionState, StateChange, StateMachine, STATE_HISTORY_LIMIT};
pub use stats::{ClientStats, Counters, HealthReport};
