//! Streaming client
//!
//! [`StreamingClient`] owns one transport and drives its session lifecycle:
//! connect with retries, stream audio (queueing it while disconnected), and
//! publish state changes and transcripts through its [`EventHub`].
//!
//! Every mutation of state, queue, and counters happens under one short-lived
//! lock that is never held across an await or while handlers run.

mod audio;
mod connection;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ClientConfig, ConfigUpdate};
use crate::error::ClientError;
use crate::events::{ClientEvent, EventHub, EventKind, SubscriptionId};
use crate::queue::AudioQueue;
use crate::retry::RetryPolicy;
use crate::state::{ClientStats, ConnectionState, Counters, HealthReport, StateChange, StateMachine};
use crate::transport::Transport;

/// Capacity of the broadcast channel behind [`StreamingClient::subscribe`]
const EVENT_CHANNEL_CAPACITY: usize = 256;

type ConnectOutcome = Result<(), ClientError>;

/// Resilient client for one streaming transcription connection
///
/// Cloning yields another handle to the same client; concurrent `connect`
/// calls from any handle share a single attempt.
#[derive(Clone)]
pub struct StreamingClient {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    transport: Arc<dyn Transport>,
    settings: RwLock<Settings>,
    core: Mutex<Core>,
    events: EventHub,
    /// Set while the queue drain worker is running
    draining: AtomicBool,
}

struct Settings {
    config: ClientConfig,
    policy: RetryPolicy,
}

/// Mutable client state, guarded by `Inner::core`
struct Core {
    machine: StateMachine,
    counters: Counters,
    last_error: Option<ClientError>,
    queue: AudioQueue,
    /// Bumped by every new connect and every disconnect; work tagged with an
    /// older epoch must not touch state
    epoch: u64,
    in_flight: Option<InFlight>,
    session: Option<ActiveSession>,
}

/// A connect call that is still running
struct InFlight {
    cancel: watch::Sender<bool>,
    outcome: watch::Receiver<Option<ConnectOutcome>>,
}

struct ActiveSession {
    id: String,
    listener: Option<JoinHandle<()>>,
}

impl StreamingClient {
    pub fn new<T>(config: ClientConfig, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let policy = RetryPolicy::from_config(&config);
        let core = Core {
            machine: StateMachine::new(),
            counters: Counters::default(),
            last_error: None,
            queue: AudioQueue::new(config.performance.max_queue_size),
            epoch: 0,
            in_flight: None,
            session: None,
        };

        Self {
            inner: Arc::new(Inner {
                transport,
                settings: RwLock::new(Settings { config, policy }),
                core: Mutex::new(core),
                events: EventHub::new(EVENT_CHANNEL_CAPACITY),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Register a handler for one kind of event
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    /// Unregister a handler previously returned by [`StreamingClient::on`]
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.off(id)
    }

    /// Receive every event on a broadcast channel
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state() == ConnectionState::Connected
    }

    /// Id of the open session, if connected
    pub fn session_id(&self) -> Option<String> {
        self.inner.core().session.as_ref().map(|s| s.id.clone())
    }

    /// Snapshot of counters, uptime, last error, and state history
    pub fn stats(&self) -> ClientStats {
        let core = self.inner.core();
        ClientStats {
            counters: core.counters,
            uptime: core.machine.uptime(),
            last_error: core.last_error.clone(),
            state_history: core.machine.history(),
            queued_chunks: core.queue.len(),
        }
    }

    pub fn config(&self) -> ClientConfig {
        self.inner.settings().config.clone()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.settings().policy
    }

    /// Replace configuration fields wholesale
    ///
    /// The retry policy is recomputed and the queue resized immediately. A
    /// connect call already in progress keeps the policy it started with.
    pub fn update_config(&self, update: ConfigUpdate) {
        let capacity = {
            let mut settings = self.inner.settings_mut();
            update.apply_to(&mut settings.config);
            settings.policy = RetryPolicy::from_config(&settings.config);
            settings.config.performance.max_queue_size
        };

        let dropped = self.inner.core().queue.set_capacity(capacity);
        if dropped > 0 {
            warn!(dropped, capacity, "queue capacity reduced, oldest audio dropped");
        }
        info!("configuration updated");
    }

    pub fn health_check(&self) -> HealthReport {
        let summary = self.inner.settings().config.summary();
        let stats = self.stats();
        HealthReport::new(self.connection_state(), stats, summary)
    }
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("state", &self.connection_state())
            .field("session_id", &self.session_id())
            .field("events", &self.inner.events)
            .finish()
    }
}

impl Inner {
    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings_mut(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        self.core().machine.state()
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.core().epoch == epoch
    }

    /// Publish a recorded transition, if there was one
    fn emit_transition(&self, change: Option<StateChange>) {
        if let Some(change) = change {
            self.events.emit(ClientEvent::ConnectionState {
                state: change.to,
                previous: change.from,
            });
        }
    }

    /// Remember `error` for health reporting and publish it
    fn record_error(&self, error: ClientError) {
        self.core().last_error = Some(error.clone());
        self.events.emit(ClientEvent::Error { error });
    }
}
