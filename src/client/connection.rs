//! Connection lifecycle for `StreamingClient`
//!
//! One connect call runs as a single spawned driver task: establish, classify
//! failures, back off, retry. Callers only wait on its outcome, so overlapping
//! calls collapse onto one attempt and the driver survives a caller being
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::{ActiveSession, ConnectOutcome, InFlight, Inner, StreamingClient};
use crate::error::{classify, ClientError};
use crate::events::ClientEvent;
use crate::state::{ConnectionState, StateChange};
use crate::transport::{TransportError, TransportEvent, TransportEventSender};

/// How a connect call was entered
enum Begin {
    AlreadyConnected,
    Joined(watch::Receiver<Option<ConnectOutcome>>),
    Started {
        epoch: u64,
        cancel: watch::Receiver<bool>,
        outcome_tx: watch::Sender<Option<ConnectOutcome>>,
        outcome_rx: watch::Receiver<Option<ConnectOutcome>>,
    },
}

enum EstablishError {
    Cancelled,
    TimedOut(Duration),
    Failed(ClientError),
}

struct EstablishedSession {
    id: String,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl StreamingClient {
    /// Open the streaming session, retrying per the configured policy
    ///
    /// Returns at once if already connected. While another connect is in
    /// progress this waits for it and reports the same outcome.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.connect().await
    }

    /// Close the session and reset per-connection state
    ///
    /// Safe from any state. A connect still in progress is cancelled and its
    /// callers receive a `CANCELLED` error. Queued audio is discarded.
    pub async fn disconnect(&self) {
        self.inner.disconnect().await
    }
}

impl Inner {
    async fn connect(self: &Arc<Self>) -> ConnectOutcome {
        let outcome = match self.begin_connect() {
            (Begin::AlreadyConnected, _) => return Ok(()),
            (Begin::Joined(outcome), _) => {
                debug!("connect already in progress, waiting on it");
                outcome
            }
            (
                Begin::Started {
                    epoch,
                    cancel,
                    outcome_tx,
                    outcome_rx,
                },
                change,
            ) => {
                self.emit_transition(change);

                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    let result = inner.run_connect(epoch, cancel).await;
                    let _ = outcome_tx.send(Some(result));
                });
                outcome_rx
            }
        };

        wait_for_outcome(outcome).await
    }

    fn begin_connect(&self) -> (Begin, Option<StateChange>) {
        let mut core = self.core();

        if core.machine.state() == ConnectionState::Connected {
            return (Begin::AlreadyConnected, None);
        }

        if let Some(in_flight) = &core.in_flight {
            // A driver that died without reporting leaves a closed channel behind
            if in_flight.outcome.has_changed().is_ok() {
                return (Begin::Joined(in_flight.outcome.clone()), None);
            }
            warn!("discarding stale connect attempt");
            core.in_flight = None;
        }

        core.epoch += 1;
        let epoch = core.epoch;
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        core.in_flight = Some(InFlight {
            cancel: cancel_tx,
            outcome: outcome_rx.clone(),
        });
        core.counters.connection_attempts += 1;
        let change = core.machine.transition_to(ConnectionState::Connecting);

        info!(epoch, "connecting");

        (
            Begin::Started {
                epoch,
                cancel: cancel_rx,
                outcome_tx,
                outcome_rx,
            },
            change,
        )
    }

    /// Retry loop for one connect call
    async fn run_connect(
        self: Arc<Self>,
        epoch: u64,
        mut cancel: watch::Receiver<bool>,
    ) -> ConnectOutcome {
        let (policy, timeout) = {
            let settings = self.settings();
            (settings.policy, settings.config.connection_timeout())
        };

        let mut last_error = None;

        for attempt in 0..=policy.max_retries {
            if attempt > 0 {
                let delay = policy.delay_for(attempt - 1);
                if !self.begin_retry(epoch, attempt, delay) {
                    return Err(cancelled_error());
                }
                if !sleep_unless_cancelled(delay, &mut cancel).await {
                    return Err(cancelled_error());
                }
            }

            debug!(attempt, timeout_ms = timeout.as_millis() as u64, "establishing session");

            match self.establish(epoch, timeout, &mut cancel).await {
                Ok(session) => return self.finish_connect(epoch, session),
                Err(EstablishError::Cancelled) => return Err(cancelled_error()),
                Err(EstablishError::TimedOut(after)) => {
                    let error = ClientError::connection(format!(
                        "connection timeout after {}ms",
                        after.as_millis()
                    ));
                    warn!(attempt, %error, "connection attempt timed out");
                    last_error = Some(error);
                }
                Err(EstablishError::Failed(error)) => {
                    warn!(attempt, code = %error.code(), %error, "connection attempt failed");

                    if error.is_rate_limit() {
                        let cooldown = error
                            .retry_after()
                            .unwrap_or_else(|| policy.delay_for(attempt));
                        info!(
                            cooldown_ms = cooldown.as_millis() as u64,
                            "rate limited, waiting out cooldown before giving up"
                        );
                        if !sleep_unless_cancelled(cooldown, &mut cancel).await {
                            return Err(cancelled_error());
                        }
                        return Err(self.fail_connect(epoch, error, Some(cooldown)));
                    }

                    if !error.is_retryable() {
                        return Err(self.fail_connect(epoch, error, None));
                    }

                    last_error = Some(error);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| ClientError::connection("connection failed"));
        Err(self.fail_connect(epoch, error, None))
    }

    /// One attempt: race the open notification against failure, timeout, and cancel
    async fn establish(
        &self,
        epoch: u64,
        timeout: Duration,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<EstablishedSession, EstablishError> {
        let (sender, mut events) = TransportEventSender::channel();

        let outcome = {
            let negotiation = self.transport.connect(sender);
            tokio::pin!(negotiation);
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);
            let mut negotiating = true;

            loop {
                tokio::select! {
                    biased;

                    result = &mut negotiation, if negotiating => {
                        negotiating = false;
                        if let Err(err) = result {
                            break Err(EstablishError::Failed(classify(err)));
                        }
                    }

                    event = events.recv() => match event {
                        Some(TransportEvent::Open { session_id }) => break Ok(session_id),
                        Some(TransportEvent::Error(err)) => {
                            break Err(EstablishError::Failed(classify(err)));
                        }
                        Some(TransportEvent::Closed { code, reason }) => {
                            break Err(EstablishError::Failed(closed_before_open(code, reason)));
                        }
                        Some(TransportEvent::Transcript(_)) => {
                            debug!("ignoring transcript received before session open");
                        }
                        None => {
                            break Err(EstablishError::Failed(ClientError::connection(
                                "transport dropped the session before it opened",
                            )));
                        }
                    },

                    _ = cancelled(cancel) => break Err(EstablishError::Cancelled),

                    _ = &mut deadline => break Err(EstablishError::TimedOut(timeout)),
                }
            }
        };

        match outcome {
            Ok(id) => Ok(EstablishedSession { id, events }),
            Err(err) => {
                // A timed-out negotiation may still be running. Cancellation is
                // closed by `disconnect` itself, and once the epoch has moved on
                // a newer connect may own the transport.
                if matches!(err, EstablishError::TimedOut(_)) && self.is_current(epoch) {
                    self.close_transport().await;
                }
                Err(err)
            }
        }
    }

    /// Record a successful attempt and start listening to the session
    fn finish_connect(
        self: &Arc<Self>,
        epoch: u64,
        session: EstablishedSession,
    ) -> ConnectOutcome {
        let EstablishedSession { id, events } = session;

        let change = {
            let mut core = self.core();
            if core.epoch != epoch {
                None
            } else {
                core.in_flight = None;
                core.counters.successful_connections += 1;
                core.last_error = None;
                core.session = Some(ActiveSession {
                    id: id.clone(),
                    listener: None,
                });
                Some(core.machine.transition_to(ConnectionState::Connected))
            }
        };

        let Some(change) = change else {
            // Disconnected between open and bookkeeping; `disconnect` already closed it
            return Err(cancelled_error());
        };

        info!(session_id = %id, "session established");
        self.emit_transition(change);
        self.events.emit(ClientEvent::SessionBegins { session_id: id });

        let listener = tokio::spawn(Arc::clone(self).listen(epoch, events));
        {
            let mut core = self.core();
            let current = core.epoch == epoch;
            match core.session.as_mut() {
                Some(session) if current => session.listener = Some(listener),
                _ => listener.abort(),
            }
        }

        self.trigger_drain();
        Ok(())
    }

    fn begin_retry(&self, epoch: u64, attempt: u32, delay: Duration) -> bool {
        let change = {
            let mut core = self.core();
            if core.epoch != epoch {
                return false;
            }
            core.counters.retry_attempts += 1;
            core.machine.transition_to(ConnectionState::Reconnecting)
        };

        let delay_ms = delay.as_millis() as u64;
        info!(attempt, delay_ms, "retrying connection");
        self.emit_transition(change);
        self.events.emit(ClientEvent::RetryAttempt { attempt, delay_ms });
        true
    }

    /// Terminal failure of a connect call; returns the error to surface
    fn fail_connect(
        &self,
        epoch: u64,
        error: ClientError,
        rate_limit_cooldown: Option<Duration>,
    ) -> ClientError {
        let change = {
            let mut core = self.core();
            if core.epoch != epoch {
                return cancelled_error();
            }
            core.in_flight = None;
            core.last_error = Some(error.clone());
            core.machine.transition_to(ConnectionState::Error)
        };

        error!(code = %error.code(), %error, "connect failed");
        self.emit_transition(change);
        if let Some(cooldown) = rate_limit_cooldown {
            self.events.emit(ClientEvent::RateLimit {
                retry_after_ms: cooldown.as_millis() as u64,
            });
        }
        self.events.emit(ClientEvent::Error {
            error: error.clone(),
        });
        error
    }

    /// Consume notifications of an open session until it ends
    async fn listen(
        self: Arc<Self>,
        epoch: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            if !self.is_current(epoch) {
                return;
            }

            match event {
                TransportEvent::Transcript(transcript) => {
                    self.core().counters.transcripts_received += 1;
                    self.events.emit(ClientEvent::Transcript { transcript });
                }
                TransportEvent::Error(err) => {
                    let error = classify(err);
                    warn!(code = %error.code(), %error, "transport reported an error");
                    self.record_error(error);
                }
                TransportEvent::Open { session_id } => {
                    debug!(%session_id, "ignoring repeated open notification");
                }
                TransportEvent::Closed { code, reason } => {
                    self.session_closed(epoch, code, reason);
                    return;
                }
            }
        }

        self.session_closed(epoch, None, Some("transport event stream ended".to_string()));
    }

    /// Server-side drop of a connected session
    fn session_closed(&self, epoch: u64, code: Option<u16>, reason: Option<String>) {
        let change = {
            let mut core = self.core();
            if core.epoch != epoch || core.machine.state() != ConnectionState::Connected {
                return;
            }
            // Dropping our own handle only detaches this task
            core.session = None;
            core.machine.transition_to(ConnectionState::Disconnected)
        };

        warn!(?code, ?reason, "session terminated by the service");
        self.emit_transition(change);
        self.events.emit(ClientEvent::SessionTerminated { code, reason });
    }

    async fn disconnect(&self) {
        let (change, session, in_flight, dropped) = {
            let mut core = self.core();
            core.epoch += 1;
            let in_flight = core.in_flight.take();
            let session = core.session.take();
            let dropped = core.queue.clear();
            let change = core.machine.transition_to(ConnectionState::Disconnected);
            (change, session, in_flight, dropped)
        };

        if let Some(in_flight) = &in_flight {
            debug!("cancelling connect in progress");
            let _ = in_flight.cancel.send(true);
        }

        if let Some(session) = session {
            if let Some(listener) = session.listener {
                listener.abort();
            }
            self.close_transport().await;
            info!(session_id = %session.id, dropped_chunks = dropped, "disconnected");
        } else if in_flight.is_some() {
            // Close before returning so a following connect never races a late close
            self.close_transport().await;
            info!(dropped_chunks = dropped, "connect cancelled");
        } else if dropped > 0 {
            debug!(dropped_chunks = dropped, "cleared queued audio");
        }

        self.emit_transition(change);
    }

    /// Best-effort close; failures are logged, never returned
    async fn close_transport(&self) {
        if let Err(err) = self.transport.close().await {
            warn!(error = %err, "transport close failed");
        }
    }
}

async fn wait_for_outcome(mut rx: watch::Receiver<Option<ConnectOutcome>>) -> ConnectOutcome {
    let outcome = rx.wait_for(Option::is_some).await.map(|result| result.clone());
    match outcome {
        Ok(Some(result)) => result,
        Ok(None) => Err(cancelled_error()),
        Err(_) => Err(ClientError::cancelled(
            "connect task ended without reporting an outcome",
        )),
    }
}

/// Resolves once the connect call is cancelled (or its canceller is gone)
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

/// Returns false if cancelled before `duration` elapsed
async fn sleep_unless_cancelled(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancelled(cancel) => false,
    }
}

fn cancelled_error() -> ClientError {
    ClientError::cancelled("connect cancelled by disconnect")
}

fn closed_before_open(code: Option<u16>, reason: Option<String>) -> ClientError {
    let mut message = "session closed before opening".to_string();
    if let Some(code) = code {
        message.push_str(&format!(" (code {code})"));
    }
    if let Some(reason) = reason {
        message.push_str(&format!(": {reason}"));
    }
    // Close reasons are free text; let the normal classification decide
    match classify(TransportError::Message(message.clone())) {
        ClientError::Client { .. } => ClientError::connection(message),
        classified => classified,
    }
}
