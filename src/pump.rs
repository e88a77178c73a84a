//! Frame pump: moves the filled slot into a free device ring slot

use tracing::{trace, warn};

use crate::sink::{DeviceSink, QueueRequest, SinkState};
use crate::types::{BufferSlot, StreamFlags, StreamState};

/// Why a pump call did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotStreaming,
    StreamOff,
    SlotEmpty,
    /// The frame does not fit the 32-bit `bytesused` field
    FrameTooLarge,
}

/// Result of a single [`FramePump::try_pump`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Frame queued into ring slot `index`
    Pumped { index: u32 },
    /// A precondition was unmet; nothing reached the sink
    Skipped(SkipReason),
    /// No buffer could be reclaimed; the slot stays filled
    DequeueFailed,
    /// Ring slot `index` was reclaimed but could not be resubmitted
    QueueFailed { index: u32 },
}

impl PumpOutcome {
    pub fn is_pumped(self) -> bool {
        matches!(self, PumpOutcome::Pumped { .. })
    }
}

/// Stateless transition logic between the source slot and the sink ring
#[derive(Debug, Clone, Copy, Default)]
pub struct FramePump {
    count_buffers: bool,
}

impl FramePump {
    /// `count_buffers` enables the `buffers_processed` diagnostic counter.
    pub fn new(count_buffers: bool) -> Self {
        Self { count_buffers }
    }

    /// Dequeue one completed device buffer and queue the slot's frame in its place.
    ///
    /// Device errors are logged and reported through the outcome; the loop
    /// retries on the next readiness event.
    pub fn try_pump<S: DeviceSink + ?Sized>(
        &self,
        slot: &mut BufferSlot,
        sink: &mut S,
        sink_state: &mut SinkState,
        flags: &StreamFlags,
    ) -> PumpOutcome {
        if !sink_state.is_streaming {
            return PumpOutcome::Skipped(SkipReason::NotStreaming);
        }
        if flags.stream_state() == StreamState::Off {
            return PumpOutcome::Skipped(SkipReason::StreamOff);
        }
        let Some((data, bytesused)) = slot.frame() else {
            return PumpOutcome::Skipped(SkipReason::SlotEmpty);
        };

        let Some(bytesused) = bytesused_field(bytesused) else {
            warn!("UVC: Frame of {} bytes exceeds the bytesused field, dropping", bytesused);
            slot.mark_consumed();
            return PumpOutcome::Skipped(SkipReason::FrameTooLarge);
        };

        let index = match sink.dequeue_buffer() {
            Ok(index) => index,
            Err(e) => {
                warn!("UVC: Unable to dequeue buffer: {}", error_detail(&e));
                return PumpOutcome::DequeueFailed;
            }
        };

        let request = QueueRequest { index, data, bytesused };
        if let Err(e) = sink.queue_buffer(request) {
            warn!("UVC: Unable to queue buffer {}: {}", index, error_detail(&e));
            return PumpOutcome::QueueFailed { index };
        }

        slot.mark_consumed();
        if self.count_buffers {
            sink_state.buffers_processed += 1;
        }
        trace!(index, bytesused, "Frame queued");
        PumpOutcome::Pumped { index }
    }
}

/// `bytesused` as the device's 32-bit field, `None` when it does not fit
fn bytesused_field(bytesused: usize) -> Option<u32> {
    u32::try_from(bytesused).ok()
}

/// Error text including the OS errno where one exists
fn error_detail(err: &crate::RelayError) -> String {
    match std::error::Error::source(err).and_then(|s| s.downcast_ref::<std::io::Error>()) {
        Some(io) => match io.raw_os_error() {
            Some(errno) => format!("{} ({})", io, errno),
            None => io.to_string(),
        },
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockSink;
    use std::io;
    use std::sync::Arc;

    fn streaming() -> (SinkState, Arc<StreamFlags>) {
        let flags = StreamFlags::new();
        flags.set_stream_state(StreamState::On);
        (SinkState { is_streaming: true, buffers_processed: 0 }, flags)
    }

    fn filled_slot(bytesused: usize) -> BufferSlot {
        let mut slot = BufferSlot::new(8192);
        slot.mark_filled(bytesused).expect("fill");
        slot
    }

    #[test]
    fn pumps_filled_slot_zero_copy() {
        let (mut state, flags) = streaming();
        let mut sink = MockSink::new(4);
        let mut slot = filled_slot(4096);
        let slot_ptr = slot.frame().expect("frame").0.as_ptr() as usize;

        let outcome = FramePump::new(true).try_pump(&mut slot, &mut sink, &mut state, &flags);

        assert_eq!(outcome, PumpOutcome::Pumped { index: 0 });
        assert_eq!(sink.dequeue_calls(), 1);
        let queued = sink.queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].index, 0);
        assert_eq!(queued[0].bytesused, 4096);
        assert_eq!(queued[0].length, 8192);
        assert_eq!(queued[0].address, slot_ptr);
        assert!(slot.needs_refill());
        assert_eq!(state.buffers_processed, 1);
    }

    #[test]
    fn targets_the_dequeued_ring_index() {
        let (mut state, flags) = streaming();
        let mut sink = MockSink::new(4);
        let pump = FramePump::new(false);
        for expected in 0..6u32 {
            let mut slot = filled_slot(16);
            let outcome = pump.try_pump(&mut slot, &mut sink, &mut state, &flags);
            assert_eq!(outcome, PumpOutcome::Pumped { index: expected % 4 });
        }
        assert_eq!(state.buffers_processed, 0, "counter only runs with diagnostics");
    }

    #[test]
    fn unmet_preconditions_touch_nothing() {
        let pump = FramePump::new(true);

        let (mut state, flags) = streaming();
        state.is_streaming = false;
        let mut sink = MockSink::new(2);
        let mut slot = filled_slot(16);
        assert_eq!(
            pump.try_pump(&mut slot, &mut sink, &mut state, &flags),
            PumpOutcome::Skipped(SkipReason::NotStreaming)
        );
        assert!(slot.filled());

        let (mut state, flags) = streaming();
        flags.set_stream_state(StreamState::Off);
        assert_eq!(
            pump.try_pump(&mut slot, &mut sink, &mut state, &flags),
            PumpOutcome::Skipped(SkipReason::StreamOff)
        );
        assert!(slot.filled());

        let (mut state, flags) = streaming();
        let mut empty = BufferSlot::new(16);
        assert_eq!(
            pump.try_pump(&mut empty, &mut sink, &mut state, &flags),
            PumpOutcome::Skipped(SkipReason::SlotEmpty)
        );

        assert_eq!(sink.dequeue_calls(), 0);
        assert!(sink.queued().is_empty());
        assert_eq!(state.buffers_processed, 0);
    }

    #[test]
    fn dequeue_failure_keeps_slot_filled() {
        let (mut state, flags) = streaming();
        let mut sink = MockSink::new(2);
        sink.fail_next_dequeue(io::ErrorKind::WouldBlock);
        let mut slot = filled_slot(16);

        let outcome = FramePump::new(true).try_pump(&mut slot, &mut sink, &mut state, &flags);

        assert_eq!(outcome, PumpOutcome::DequeueFailed);
        assert!(slot.filled());
        assert_eq!(sink.queue_calls(), 0);
        assert_eq!(state.buffers_processed, 0);
    }

    #[test]
    fn queue_failure_keeps_slot_filled() {
        let (mut state, flags) = streaming();
        let mut sink = MockSink::new(2);
        sink.fail_next_queue(io::ErrorKind::InvalidInput);
        let mut slot = filled_slot(16);

        let outcome = FramePump::new(true).try_pump(&mut slot, &mut sink, &mut state, &flags);

        assert_eq!(outcome, PumpOutcome::QueueFailed { index: 0 });
        assert!(slot.filled());
        assert_eq!(sink.queue_calls(), 1);
        assert!(sink.queued().is_empty());
        assert_eq!(state.buffers_processed, 0);
    }

    #[test]
    fn bytesused_fits_the_device_field() {
        assert_eq!(bytesused_field(0), Some(0));
        assert_eq!(bytesused_field(u32::MAX as usize), Some(u32::MAX));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_bytesused_is_rejected_not_truncated() {
        assert_eq!(bytesused_field(u32::MAX as usize + 1), None);
        assert_eq!(bytesused_field(usize::MAX), None);
    }

    #[test]
    fn error_detail_includes_errno() {
        let err = crate::RelayError::dequeue_failed(io::Error::from_raw_os_error(libc::EAGAIN));
        assert!(error_detail(&err).ends_with(&format!("({})", libc::EAGAIN)));
    }
}
