//! Paced, zero-copy relay of raw video frames into a UVC gadget.
//!
//! uvcrelay moves frames from a source (standard input, or any
//! [`RefillDriver`]) into the buffer ring of a V4L2 output device through a
//! single staging buffer, without copying the frame on the way.
//!
//! # Features
//!
//! - **Zero copy**: the device is handed the staging buffer's address directly
//! - **Pacing**: frames leave at a configured rate on an additive schedule
//! - **Single threaded**: one loop owns the device, the slot and the schedule
//! - **Pluggable**: control events, refill and housekeeping are hooks
//! - **Async friendly**: [`RelayDriver`] runs the loop under tokio
//!
//! # Quick Start
//!
//! ```rust,no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> uvcrelay::Result<()> {
//! use uvcrelay::{RelayConfig, UvcRelay};
//!
//! let config = RelayConfig::from_path("relay.yaml")?;
//! let mut relay = UvcRelay::stdin_to_device("/dev/video0", config)?;
//! let report = relay.run();
//! println!("{:?} after {} frames", report.exit, report.stats.frames_pumped);
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Relay components
pub mod hooks;
pub mod multiplexer;
pub mod pacing;
pub mod pump;
pub mod relay;
pub mod sink;

// Runtime integration
pub mod driver;
pub mod signals;

// Platform-specific modules
#[cfg(target_os = "linux")]
pub mod uvc;

// Core exports
pub use config::{RelayConfig, TimeoutPolicy};
pub use error::*;
pub use types::*;

// Main API exports
pub use driver::{RelayChannels, RelayDriver};
pub use hooks::{ControlEventHandler, Housekeeping, ReaderRefill, RefillDriver};
pub use relay::{ExitReason, RelayLoop, RelayReport, RelayStats};
pub use sink::{DeviceSink, SinkState};

#[cfg(target_os = "linux")]
pub use uvc::UvcDevice;

/// Ring slots requested from the device by [`UvcRelay`]
pub const DEFAULT_RING_BUFFERS: u32 = 4;

/// Entry point wiring standard input to a UVC gadget node.
///
/// # Examples
///
/// ```rust,no_run
/// # #[cfg(target_os = "linux")]
/// # fn main() -> uvcrelay::Result<()> {
/// use uvcrelay::{RelayConfig, UvcRelay};
///
/// let relay = UvcRelay::stdin_to_device("/dev/video0", RelayConfig::default())?;
/// # Ok(())
/// # }
/// # #[cfg(not(target_os = "linux"))]
/// # fn main() {}
/// ```
pub struct UvcRelay;

impl UvcRelay {
    /// Open `device`, start streaming and build a loop fed from stdin.
    ///
    /// SIGINT and SIGTERM are bound to the loop's terminate flag. The device
    /// is streaming when this returns, so the loop's sink state starts out
    /// streaming and the stream flag starts `On`; install a
    /// [`ControlEventHandler`] through [`RelayLoop::builder`] instead when the
    /// host negotiates stream start through UVC control events.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the configuration is invalid
    /// - the device cannot be opened or refuses USERPTR buffers
    /// - streaming cannot be started
    /// - signal handlers cannot be installed
    #[cfg(target_os = "linux")]
    pub fn stdin_to_device<P: AsRef<std::path::Path>>(
        device: P,
        config: RelayConfig,
    ) -> Result<RelayLoop<UvcDevice>> {
        config.validate()?;

        let mut sink = UvcDevice::open(device)?;
        sink.request_buffers(DEFAULT_RING_BUFFERS)?;
        sink.stream_on()?;

        let flags = StreamFlags::new();
        flags.set_stream_state(StreamState::On);
        signals::install_termination_handlers(&flags)?;

        RelayLoop::builder(config, sink, ReaderRefill::stdin())
            .flags(flags)
            .sink_state(SinkState { is_streaming: true, buffers_processed: 0 })
            .build()
    }

    /// UVC output requires Linux; always fails elsewhere.
    ///
    /// The success type is uninhabited, so callers matching on the Linux
    /// signature's `Ok` arm still compile and the arm is statically dead.
    #[cfg(not(target_os = "linux"))]
    pub fn stdin_to_device<P: AsRef<std::path::Path>>(
        _device: P,
        _config: RelayConfig,
    ) -> Result<std::convert::Infallible> {
        Err(RelayError::unsupported_platform("UVC gadget output", "Linux"))
    }
}
