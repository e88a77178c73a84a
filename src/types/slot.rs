//! Single in-flight frame slot shared by the refill driver and the pump

use crate::{RelayError, Result};

/// Ownership state of the slot
///
/// Exactly one side may touch the bytes at a time: the refill driver while the
/// slot is [`SlotState::NeedsRefill`], the pump while it is [`SlotState::Filled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Empty; the refill driver must repopulate it before the next pump.
    NeedsRefill,
    /// Holds a complete frame of `bytesused` bytes.
    Filled,
}

/// One frame's worth of source bytes plus readiness state
pub struct BufferSlot {
    data: Box<[u8]>,
    bytesused: usize,
    state: SlotState,
}

impl BufferSlot {
    /// Allocate a slot of `length` bytes awaiting its first refill.
    pub fn new(length: usize) -> Self {
        Self { data: vec![0u8; length].into_boxed_slice(), bytesused: 0, state: SlotState::NeedsRefill }
    }

    /// Capacity of the region in bytes
    pub fn length(&self) -> usize {
        self.data.len()
    }

    /// Bytes valid for the current frame
    pub fn bytesused(&self) -> usize {
        self.bytesused
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn filled(&self) -> bool {
        self.state == SlotState::Filled
    }

    pub fn needs_refill(&self) -> bool {
        self.state == SlotState::NeedsRefill
    }

    /// Writable view of the region, available only while the slot awaits refill.
    pub fn refill_buffer(&mut self) -> Option<&mut [u8]> {
        match self.state {
            SlotState::NeedsRefill => Some(&mut self.data),
            SlotState::Filled => None,
        }
    }

    /// Publish a complete frame of `bytesused` bytes.
    ///
    /// Fails without changing state if the slot is already filled or
    /// `bytesused` exceeds the capacity.
    pub fn mark_filled(&mut self, bytesused: usize) -> Result<()> {
        if self.state != SlotState::NeedsRefill {
            return Err(RelayError::slot_violation("slot filled while still holding a frame"));
        }
        if bytesused > self.data.len() {
            return Err(RelayError::slot_violation(format!(
                "bytesused {} exceeds slot length {}",
                bytesused,
                self.data.len()
            )));
        }
        self.bytesused = bytesused;
        self.state = SlotState::Filled;
        Ok(())
    }

    /// The whole region and the valid byte count, available only while filled.
    pub fn frame(&self) -> Option<(&[u8], usize)> {
        match self.state {
            SlotState::Filled => Some((&self.data, self.bytesused)),
            SlotState::NeedsRefill => None,
        }
    }

    /// Hand the slot back to the refill driver after a successful pump.
    pub(crate) fn mark_consumed(&mut self) {
        debug_assert_eq!(self.state, SlotState::Filled);
        self.state = SlotState::NeedsRefill;
    }
}

impl std::fmt::Debug for BufferSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSlot")
            .field("length", &self.data.len())
            .field("bytesused", &self.bytesused)
            .field("state", &self.state)
            .finish()
    }
}
