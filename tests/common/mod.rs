//! Shared fixtures for client integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stt_link::{
    ClientConfig, ClientEvent, EventKind, StreamingClient, Transcript, Transport, TransportError,
    TransportEventSender,
};

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// What the mock does on one `connect` call
pub enum Step {
    /// Negotiation starts fine and the session opens after the delay
    OpenAfter(Duration),
    /// `connect` itself returns the error
    Fail(TransportError),
    /// Negotiation starts, then an error notification arrives
    EmitError(TransportError),
    /// Negotiation never completes
    Hang,
}

type Fallback = Box<dyn Fn() -> Step + Send + Sync>;

struct MockState {
    script: Mutex<VecDeque<Step>>,
    fallback: Fallback,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
    sent: Mutex<Vec<Vec<u8>>>,
    fail_sends: AtomicBool,
    send_delay: Mutex<Duration>,
    sender: Mutex<Option<TransportEventSender>>,
}

/// Scripted transport; clones share state so tests can inspect and drive it
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    /// Every connect opens a session after 10ms
    pub fn new() -> Self {
        Self::with_fallback(|| Step::OpenAfter(ms(10)))
    }

    /// Steps run in order, then `fallback` is used for every later connect
    pub fn with_fallback<F>(fallback: F) -> Self
    where
        F: Fn() -> Step + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(MockState {
                script: Mutex::new(VecDeque::new()),
                fallback: Box::new(fallback),
                connect_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                fail_sends: AtomicBool::new(false),
                send_delay: Mutex::new(Duration::ZERO),
                sender: Mutex::new(None),
            }),
        }
    }

    pub fn then(self, step: Step) -> Self {
        self.state.script.lock().unwrap().push_back(step);
        self
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make every `send_audio` take `delay` before it succeeds or fails
    pub fn slow_sends(&self, delay: Duration) {
        *self.state.send_delay.lock().unwrap() = delay;
    }

    /// Push a transcript on the latest session
    pub fn emit_transcript(&self, text: &str) -> bool {
        self.latest_sender()
            .map(|tx| tx.transcript(Transcript::new(text, true, 0.9)))
            .unwrap_or(false)
    }

    /// Push an error notification on the latest session
    pub fn emit_error(&self, error: impl Into<TransportError>) -> bool {
        self.latest_sender()
            .map(|tx| tx.error(error))
            .unwrap_or(false)
    }

    /// Simulate the service closing the latest session
    pub fn close_from_server(&self, code: Option<u16>, reason: &str) -> bool {
        self.latest_sender()
            .map(|tx| tx.closed(code, Some(reason.to_string())))
            .unwrap_or(false)
    }

    fn latest_sender(&self) -> Option<TransportEventSender> {
        self.state.sender.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let scripted = self.state.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| (self.state.fallback)())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, events: TransportEventSender) -> Result<(), TransportError> {
        let call = self.state.connect_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.sender.lock().unwrap() = Some(events.clone());

        match self.next_step() {
            Step::OpenAfter(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    events.open(format!("session-{call}"));
                });
                Ok(())
            }
            Step::Fail(error) => Err(error),
            Step::EmitError(error) => {
                events.error(error);
                Ok(())
            }
            Step::Hang => std::future::pending::<Result<(), TransportError>>().await,
        }
    }

    async fn send_audio(&self, chunk: Vec<u8>) -> Result<(), TransportError> {
        let delay = *self.state.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Message("socket write failed".to_string()));
        }
        self.state.sent.lock().unwrap().push(chunk);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Config with short timings suitable for paused-clock tests
pub fn test_config() -> ClientConfig {
    ClientConfig {
        api_key: "test-key-0123456789".to_string(),
        connection_timeout_ms: 1_000,
        max_retries: 2,
        retry_delay_ms: 50,
        max_retry_delay_ms: 1_000,
        ..ClientConfig::default()
    }
}

/// Collects every event the client emits
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ClientEvent>>>,
}

impl EventLog {
    pub fn attach(client: &StreamingClient) -> Self {
        let log = Self::default();
        for kind in EventKind::ALL {
            let events = Arc::clone(&log.events);
            client.on(kind, move |event| events.lock().unwrap().push(event.clone()));
        }
        log
    }

    pub fn all(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<ClientEvent> {
        self.all().into_iter().filter(|e| e.kind() == kind).collect()
    }

    pub fn retry_delays(&self) -> Vec<u64> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::RetryAttempt { delay_ms, .. } => Some(delay_ms),
                _ => None,
            })
            .collect()
    }
}
