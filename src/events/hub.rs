//! Fan-out of client events to registered handlers and broadcast receivers

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{error, trace};

use super::{ClientEvent, EventKind};

/// Callback invoked synchronously for every matching event
pub type EventHandler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

/// Handle returned by [`EventHub::on`], used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    kind: EventKind,
    handler: EventHandler,
}

/// Publish/subscribe hub
///
/// Handlers run in registration order on the emitting task. A handler that
/// panics is logged and skipped; it never stops later handlers and never
/// reaches the emitter. Async consumers can instead take a broadcast receiver
/// via [`EventHub::subscribe`].
pub struct EventHub {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    broadcast_tx: broadcast::Sender<ClientEvent>,
}

impl EventHub {
    pub fn new(broadcast_capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            registrations: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            broadcast_tx,
        }
    }

    fn registrations(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for events of `kind`
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations().push(Registration {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a handler; returns false if it was not registered
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut registrations = self.registrations();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.broadcast_tx.subscribe()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registrations()
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    /// Deliver `event` to every current handler of its kind, then broadcast it
    pub fn emit(&self, event: ClientEvent) {
        let kind = event.kind();

        // Snapshot so handlers may register or unregister while running
        let handlers: Vec<EventHandler> = self
            .registrations()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Arc::clone(&r.handler))
            .collect();

        trace!(event = %kind, handlers = handlers.len(), "emitting event");

        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                error!(
                    event = %kind,
                    panic = panic_message(&*panic),
                    "event handler panicked"
                );
            }
        }

        // No receivers is not an error
        let _ = self.broadcast_tx.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("handlers", &self.registrations().len())
            .field("receivers", &self.broadcast_tx.receiver_count())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
