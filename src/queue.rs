//! Bounded FIFO for audio produced while the session is down

use std::collections::VecDeque;

/// Ordered buffer of pending audio chunks with a hard capacity
///
/// Pushing into a full queue fails instead of growing; stale real-time audio is
/// worth less than bounded memory.
#[derive(Debug, Default)]
pub struct AudioQueue {
    chunks: VecDeque<Vec<u8>>,
    capacity: usize,
    bytes: usize,
}

impl AudioQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(capacity.min(1_024)),
            capacity,
            bytes: 0,
        }
    }

    /// Append a chunk, handing it back if the queue is full
    pub fn push(&mut self, chunk: Vec<u8>) -> Result<(), Vec<u8>> {
        if self.is_full() {
            return Err(chunk);
        }
        self.bytes += chunk.len();
        self.chunks.push_back(chunk);
        Ok(())
    }

    /// Put a chunk back at the head after a failed delivery
    ///
    /// Its slot may have been refilled while the delivery was in flight; the
    /// chunk is then handed back, since it is the oldest audio in line.
    pub fn requeue(&mut self, chunk: Vec<u8>) -> Result<(), Vec<u8>> {
        if self.is_full() {
            return Err(chunk);
        }
        self.bytes += chunk.len();
        self.chunks.push_front(chunk);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Vec<u8>> {
        let chunk = self.chunks.pop_front()?;
        self.bytes -= chunk.len();
        Some(chunk)
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.chunks.len();
        self.chunks.clear();
        self.bytes = 0;
        dropped
    }

    /// Change the capacity, dropping the oldest chunks that no longer fit
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity;
        let mut dropped = 0;
        while self.chunks.len() > capacity {
            self.pop();
            dropped += 1;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.chunks.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total payload bytes currently queued
    pub fn queued_bytes(&self) -> usize {
        self.bytes
    }
}
