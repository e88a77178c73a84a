//! Device sink trait for video output buffer rings

use std::time::Duration;

use crate::Result;

/// Which readiness conditions the wait observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// An output buffer can be dequeued
    pub writable: bool,
    /// A control event is pending
    pub error_pending: bool,
}

impl Readiness {
    pub const NONE: Readiness = Readiness { writable: false, error_pending: false };
    pub const WRITABLE: Readiness = Readiness { writable: true, error_pending: false };
    pub const EVENT: Readiness = Readiness { writable: false, error_pending: true };
}

/// Result of a bounded readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Ready(Readiness),
    Timeout,
    /// The wait was aborted by a signal and should be restarted
    Interrupted,
}

/// Queue request referencing the source slot's memory directly
///
/// `data` is the whole slot region; the device reads `bytesused` bytes from it.
/// Sinks that hand the address to hardware must not touch it again after the
/// matching dequeue.
#[derive(Debug, Clone, Copy)]
pub struct QueueRequest<'a> {
    /// Ring slot returned by the preceding dequeue
    pub index: u32,
    pub data: &'a [u8],
    pub bytesused: u32,
}

/// Abstraction over a video output device's buffer ring
///
/// Implementations:
/// - [`crate::uvc::UvcDevice`]: V4L2 output node with USERPTR buffers (Linux)
/// - `test_utils::MockSink`: scripted sink for tests and benches
pub trait DeviceSink {
    /// Reclaim one completed buffer, returning its ring index.
    fn dequeue_buffer(&mut self) -> Result<u32>;

    /// Submit a frame into the ring slot named by `request.index`.
    fn queue_buffer(&mut self, request: QueueRequest<'_>) -> Result<()>;

    /// Wait up to `timeout` for the device to become writable or report a
    /// control event.
    fn wait_for_readiness(&mut self, timeout: Duration) -> Result<WaitResult>;

    /// Device identity for log lines
    fn name(&self) -> &str;
}

impl<S: DeviceSink + ?Sized> DeviceSink for Box<S> {
    fn dequeue_buffer(&mut self) -> Result<u32> {
        (**self).dequeue_buffer()
    }

    fn queue_buffer(&mut self, request: QueueRequest<'_>) -> Result<()> {
        (**self).queue_buffer(request)
    }

    fn wait_for_readiness(&mut self, timeout: Duration) -> Result<WaitResult> {
        (**self).wait_for_readiness(timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Core-side view of the sink's streaming state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkState {
    /// Set once the device accepted a start-stream negotiation
    pub is_streaming: bool,

    /// Successfully queued frames; counted only with `show_fps` enabled
    pub buffers_processed: u64,
}
