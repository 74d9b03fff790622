//! Audio path: direct sends while connected, bounded queueing otherwise

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{Inner, StreamingClient};
use crate::error::{classify, ClientError};
use crate::events::ClientEvent;
use crate::state::ConnectionState;

/// Pause between queued chunks so a backlog does not burst the service
const DRAIN_PACING: Duration = Duration::from_millis(10);

impl StreamingClient {
    /// Send one chunk of audio
    ///
    /// While connected the chunk goes straight to the transport. Otherwise it
    /// is queued (when batching is enabled) and flushed in order once the
    /// session opens. Every failure is also emitted as an `error` event.
    ///
    /// A drain stopped by a send failure resumes after the next successful
    /// direct send, so that backlog lands after the live chunk.
    pub async fn send_audio(&self, chunk: impl Into<Vec<u8>>) -> Result<(), ClientError> {
        self.inner.send_audio(chunk.into()).await
    }
}

impl Inner {
    async fn send_audio(self: &Arc<Self>, chunk: Vec<u8>) -> Result<(), ClientError> {
        if self.state() == ConnectionState::Connected {
            return self.forward(chunk).await;
        }

        if !self.settings().config.performance.enable_batching {
            let error = ClientError::not_connected();
            self.events.emit(ClientEvent::Error {
                error: error.clone(),
            });
            return Err(error);
        }

        let rejected = {
            let mut core = self.core();
            match core.queue.push(chunk) {
                Ok(()) => {
                    trace!(queued = core.queue.len(), "audio queued while disconnected");
                    None
                }
                Err(_) => Some(core.queue.capacity()),
            }
        };

        if let Some(capacity) = rejected {
            let error = ClientError::queue_full(capacity);
            warn!(capacity, "audio queue full, chunk rejected");
            self.events.emit(ClientEvent::Error {
                error: error.clone(),
            });
            return Err(error);
        }

        self.trigger_drain();
        Ok(())
    }

    async fn forward(self: &Arc<Self>, chunk: Vec<u8>) -> Result<(), ClientError> {
        match self.transport.send_audio(chunk).await {
            Ok(()) => {
                self.core().counters.audio_chunks_sent += 1;
                // Resume a backlog left behind by an earlier failed drain
                self.trigger_drain();
                Ok(())
            }
            Err(err) => {
                let error = classify(err);
                warn!(code = %error.code(), %error, "failed to send audio");
                self.record_error(error.clone());
                Err(error)
            }
        }
    }

    fn should_drain(&self) -> bool {
        let core = self.core();
        core.machine.state() == ConnectionState::Connected && !core.queue.is_empty()
    }

    /// Start the drain worker unless it is already running or there is nothing to do
    pub(super) fn trigger_drain(self: &Arc<Self>) {
        if !self.should_drain() || self.draining.swap(true, Ordering::AcqRel) {
            return;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let completed = inner.drain_queue().await;
                inner.draining.store(false, Ordering::Release);

                // A chunk queued between the last pop and the flag reset would
                // otherwise wait for the next trigger
                if !completed
                    || !inner.should_drain()
                    || inner.draining.swap(true, Ordering::AcqRel)
                {
                    break;
                }
            }
        });
    }

    /// Flush queued chunks in order; false if a send failed
    async fn drain_queue(&self) -> bool {
        let mut sent = 0usize;

        loop {
            let (chunk, epoch) = {
                let mut core = self.core();
                if core.machine.state() != ConnectionState::Connected {
                    break;
                }
                match core.queue.pop() {
                    Some(chunk) => (chunk, core.epoch),
                    None => break,
                }
            };

            match self.transport.send_audio(chunk.clone()).await {
                Ok(()) => {
                    self.core().counters.audio_chunks_sent += 1;
                    sent += 1;
                }
                Err(err) => {
                    let requeued = {
                        let mut core = self.core();
                        // Nothing to keep once a disconnect has cleared the queue
                        core.epoch == epoch && core.queue.requeue(chunk).is_ok()
                    };
                    if !requeued {
                        warn!(sent, "queue refilled or cleared during send, failed chunk dropped");
                    }
                    let error = classify(err);
                    warn!(code = %error.code(), %error, sent, "queue drain stopped");
                    self.record_error(error);
                    return false;
                }
            }

            if self.core().queue.is_empty() {
                break;
            }
            tokio::time::sleep(DRAIN_PACING).await;
        }

        if sent > 0 {
            debug!(sent, "flushed queued audio");
        }
        true
    }
}
