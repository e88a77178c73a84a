//! Stream control flags shared between the relay loop and its controllers

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Host-side stream state as signalled by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Off,
    On,
}

impl StreamState {
    fn from_u8(raw: u8) -> Self {
        if raw == 0 { StreamState::Off } else { StreamState::On }
    }

    fn as_u8(self) -> u8 {
        match self {
            StreamState::Off => 0,
            StreamState::On => 1,
        }
    }
}

/// Externally mutated control flags
///
/// The relay loop is the only reader during its decision steps. Writers are
/// the control-event handler (same thread) and signal handlers or async
/// controllers (other threads), hence atomics throughout.
#[derive(Debug)]
pub struct StreamFlags {
    terminate: Arc<AtomicBool>,
    stopped: AtomicBool,
    stream: AtomicU8,
}

impl StreamFlags {
    /// Fresh flags: not terminated, not stopped, stream off.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            terminate: Arc::new(AtomicBool::new(false)),
            stopped: AtomicBool::new(false),
            stream: AtomicU8::new(StreamState::Off.as_u8()),
        })
    }

    /// Latch the terminate flag. There is no way to clear it.
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// The raw terminate latch, for registration with signal handlers.
    pub fn terminate_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.terminate)
    }

    pub fn set_stopped(&self, stopped: bool) {
        self.stopped.store(stopped, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn set_stream_state(&self, state: StreamState) {
        self.stream.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn stream_state(&self) -> StreamState {
        StreamState::from_u8(self.stream.load(Ordering::SeqCst))
    }
}
