//! Collaborator interfaces invoked by the relay loop
//!
//! The loop calls three hooks each iteration, all on its own thread:
//!
//! - [`ControlEventHandler`] when the device reports a pending control event
//! - [`RefillDriver`] while the buffer slot awaits a new frame
//! - [`Housekeeping`] once at the end of every iteration
//!
//! Closures with the matching signature implement each trait, which keeps
//! one-off hooks short:
//!
//! ```rust
//! use uvcrelay::hooks::{ControlContext, ControlEventHandler};
//! use uvcrelay::types::StreamState;
//!
//! let on_event = |ctx: &mut ControlContext<'_>| {
//!     ctx.sink.is_streaming = true;
//!     ctx.flags.set_stream_state(StreamState::On);
//! };
//! # fn assert_handler(_: &impl ControlEventHandler) {}
//! # assert_handler(&on_event);
//! ```

use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::relay::RelayStats;
use crate::sink::SinkState;
use crate::types::{BufferSlot, StreamFlags};

/// State a control-event handler may mutate
pub struct ControlContext<'a> {
    pub sink: &'a mut SinkState,
    pub flags: &'a StreamFlags,
}

/// Handles device control-plane events (format negotiation, stream on/off)
///
/// Must not block indefinitely.
pub trait ControlEventHandler {
    fn handle_control_event(&mut self, ctx: &mut ControlContext<'_>);
}

impl<F> ControlEventHandler for F
where
    F: FnMut(&mut ControlContext<'_>),
{
    fn handle_control_event(&mut self, ctx: &mut ControlContext<'_>) {
        self(ctx)
    }
}

/// Produces source frames into the buffer slot
///
/// Only writes the slot through [`BufferSlot::refill_buffer`], which yields
/// nothing unless the slot awaits refill, and publishes a complete frame with
/// [`BufferSlot::mark_filled`]. Doing nothing when no data is ready is fine.
pub trait RefillDriver {
    fn refill(&mut self, slot: &mut BufferSlot, flags: &StreamFlags);
}

impl<F> RefillDriver for F
where
    F: FnMut(&mut BufferSlot, &StreamFlags),
{
    fn refill(&mut self, slot: &mut BufferSlot, flags: &StreamFlags) {
        self(slot, flags)
    }
}

/// Read-only view handed to housekeeping after the data-path step
pub struct TickContext<'a> {
    pub now: Instant,
    pub sink: &'a SinkState,
    pub flags: &'a StreamFlags,
    pub stats: &'a RelayStats,
}

/// Per-iteration hook with no bearing on the data path
pub trait Housekeeping {
    fn on_tick(&mut self, ctx: &TickContext<'_>);
}

impl<F> Housekeeping for F
where
    F: FnMut(&TickContext<'_>),
{
    fn on_tick(&mut self, ctx: &TickContext<'_>) {
        self(ctx)
    }
}

/// Control handler for sinks that are streaming from the start
#[derive(Debug, Default, Clone, Copy)]
pub struct NoControlEvents;

impl ControlEventHandler for NoControlEvents {
    fn handle_control_event(&mut self, _ctx: &mut ControlContext<'_>) {
        debug!("Ignoring control event");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHousekeeping;

impl Housekeeping for NoHousekeeping {
    fn on_tick(&mut self, _ctx: &TickContext<'_>) {}
}

/// Refill driver reading fixed-size frames from a byte stream
///
/// Every frame fills the whole slot. Partial reads accumulate across calls,
/// so a non-blocking reader may deliver a frame over several iterations.
/// End of stream or a hard read error latches `terminate`.
pub struct ReaderRefill<R> {
    reader: R,
    offset: usize,
    frames: u64,
}

impl<R: Read> ReaderRefill<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0, frames: 0 }
    }

    /// Complete frames delivered so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl ReaderRefill<std::io::Stdin> {
    /// Frames from the process's standard input
    pub fn stdin() -> Self {
        Self::new(std::io::stdin())
    }
}

impl<R: Read> RefillDriver for ReaderRefill<R> {
    fn refill(&mut self, slot: &mut BufferSlot, flags: &StreamFlags) {
        let Some(buf) = slot.refill_buffer() else {
            return;
        };
        let frame_len = buf.len();

        while self.offset < frame_len {
            match self.reader.read(&mut buf[self.offset..]) {
                Ok(0) => {
                    info!(
                        frames = self.frames,
                        partial_bytes = self.offset,
                        "Source reached end of stream"
                    );
                    flags.request_terminate();
                    return;
                }
                Ok(n) => self.offset += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                    return;
                }
                Err(e) => {
                    warn!("Source read failed: {}", e);
                    flags.request_terminate();
                    return;
                }
            }
        }

        self.offset = 0;
        match slot.mark_filled(frame_len) {
            Ok(()) => self.frames += 1,
            Err(e) => warn!("Dropping frame: {}", e),
        }
    }
}

/// Housekeeping hook logging frames per second from `buffers_processed`
pub struct FpsReporter {
    label: String,
    interval: Duration,
    window_start: Option<(Instant, u64)>,
    last_fps: Option<f64>,
}

impl FpsReporter {
    pub fn new(label: impl Into<String>, interval: Duration) -> Self {
        Self { label: label.into(), interval, window_start: None, last_fps: None }
    }

    /// Rate computed at the most recent report
    pub fn last_fps(&self) -> Option<f64> {
        self.last_fps
    }
}

impl Housekeeping for FpsReporter {
    fn on_tick(&mut self, ctx: &TickContext<'_>) {
        let count = ctx.sink.buffers_processed;
        let Some((start, start_count)) = self.window_start else {
            self.window_start = Some((ctx.now, count));
            return;
        };

        let elapsed = ctx.now.saturating_duration_since(start);
        if elapsed < self.interval {
            return;
        }

        let fps = count.saturating_sub(start_count) as f64 / elapsed.as_secs_f64();
        info!(total = count, "{}: {:.1} FPS", self.label, fps);
        self.last_fps = Some(fps);
        self.window_start = Some((ctx.now, count));
    }
}
