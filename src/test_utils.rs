//! Test utilities: a scripted device sink and a manually advanced clock
//!
//! Shared by unit tests and the `benchmark` feature's benches.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::pacing::Clock;
use crate::sink::{DeviceSink, QueueRequest, Readiness, WaitResult};
use crate::{RelayError, Result};

/// One successful queue submission as seen by the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    pub index: u32,
    /// Address of the submitted region, for zero-copy checks
    pub address: usize,
    pub length: usize,
    pub bytesused: u32,
}

/// In-memory sink with a ring of `ring_size` buffers
///
/// Waits are served from a script, falling back to a default result once it
/// runs dry. Dequeues cycle through ring indices in order.
#[derive(Debug)]
pub struct MockSink {
    name: String,
    ring_size: u32,
    next_index: u32,
    waits: VecDeque<std::result::Result<WaitResult, io::ErrorKind>>,
    default_wait: WaitResult,
    dequeue_failures: VecDeque<io::ErrorKind>,
    queue_failures: VecDeque<io::ErrorKind>,
    queued: Vec<QueuedFrame>,
    dequeue_calls: usize,
    queue_calls: usize,
    wait_calls: usize,
}

impl MockSink {
    pub fn new(ring_size: u32) -> Self {
        Self {
            name: "mock-uvc".to_string(),
            ring_size: ring_size.max(1),
            next_index: 0,
            waits: VecDeque::new(),
            default_wait: WaitResult::Ready(Readiness::WRITABLE),
            dequeue_failures: VecDeque::new(),
            queue_failures: VecDeque::new(),
            queued: Vec::new(),
            dequeue_calls: 0,
            queue_calls: 0,
            wait_calls: 0,
        }
    }

    /// Result returned once the wait script is exhausted
    pub fn with_default_wait(mut self, result: WaitResult) -> Self {
        self.default_wait = result;
        self
    }

    pub fn push_wait(&mut self, result: WaitResult) {
        self.waits.push_back(Ok(result));
    }

    pub fn push_wait_error(&mut self, kind: io::ErrorKind) {
        self.waits.push_back(Err(kind));
    }

    pub fn fail_next_dequeue(&mut self, kind: io::ErrorKind) {
        self.dequeue_failures.push_back(kind);
    }

    pub fn fail_next_queue(&mut self, kind: io::ErrorKind) {
        self.queue_failures.push_back(kind);
    }

    pub fn queued(&self) -> &[QueuedFrame] {
        &self.queued
    }

    /// Forget recorded submissions, keeping call counters
    pub fn clear_queued(&mut self) {
        self.queued.clear();
    }

    pub fn dequeue_calls(&self) -> usize {
        self.dequeue_calls
    }

    /// Queue attempts, including failed ones
    pub fn queue_calls(&self) -> usize {
        self.queue_calls
    }

    pub fn wait_calls(&self) -> usize {
        self.wait_calls
    }
}

impl DeviceSink for MockSink {
    fn dequeue_buffer(&mut self) -> Result<u32> {
        self.dequeue_calls += 1;
        if let Some(kind) = self.dequeue_failures.pop_front() {
            return Err(RelayError::dequeue_failed(io::Error::from(kind)));
        }
        let index = self.next_index;
        self.next_index = (self.next_index + 1) % self.ring_size;
        Ok(index)
    }

    fn queue_buffer(&mut self, request: QueueRequest<'_>) -> Result<()> {
        self.queue_calls += 1;
        if let Some(kind) = self.queue_failures.pop_front() {
            return Err(RelayError::queue_failed(request.index, io::Error::from(kind)));
        }
        self.queued.push(QueuedFrame {
            index: request.index,
            address: request.data.as_ptr() as usize,
            length: request.data.len(),
            bytesused: request.bytesused,
        });
        Ok(())
    }

    fn wait_for_readiness(&mut self, _timeout: Duration) -> Result<WaitResult> {
        self.wait_calls += 1;
        match self.waits.pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(kind)) => Err(RelayError::wait_failed(io::Error::from(kind))),
            None => Ok(self.default_wait),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Clock that only moves when told to; `sleep` advances it
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { base: Instant::now(), offset: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    pub fn start(&self) -> Instant {
        self.base
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
