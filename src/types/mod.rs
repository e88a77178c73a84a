//! Core data types shared by the relay components.
//!
//! - [`BufferSlot`] holds the single in-flight frame and its ownership state
//! - [`StreamFlags`] carries the externally mutated terminate/stopped/stream flags
//! - [`FrameRate`] turns the configured target rate into a frame interval
//! - [`FourCc`] names the source pixel format in diagnostics
//!
//! ## Usage Example
//!
//! ```rust
//! use uvcrelay::types::{BufferSlot, FrameRate, StreamFlags, StreamState};
//! use std::time::Duration;
//!
//! let mut slot = BufferSlot::new(4);
//! slot.refill_buffer().unwrap().copy_from_slice(b"\x10\x80\x10\x80");
//! slot.mark_filled(4).unwrap();
//! assert!(slot.filled());
//!
//! let flags = StreamFlags::new();
//! flags.set_stream_state(StreamState::On);
//!
//! assert_eq!(FrameRate::Fps(50).frame_interval(), Duration::from_millis(20));
//! ```

mod flags;
mod fourcc;
mod frame_rate;
mod slot;

pub use flags::{StreamFlags, StreamState};
pub use fourcc::FourCc;
pub use frame_rate::FrameRate;
pub use slot::{BufferSlot, SlotState};
