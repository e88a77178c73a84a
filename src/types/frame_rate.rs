//! Target frame rate for the relay

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Target emission rate for frames pushed into the sink
///
/// Serialized as a plain frames-per-second number, `0` meaning unpaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum FrameRate {
    /// Pump whenever a frame and a device buffer are both ready
    Unpaced,

    /// At most this many frames per second
    Fps(u32),
}

impl FrameRate {
    /// Fixed duration between permitted frame emissions.
    ///
    /// `Unpaced` and `Fps(0)` both yield a zero interval.
    pub fn frame_interval(self) -> Duration {
        match self {
            FrameRate::Unpaced | FrameRate::Fps(0) => Duration::ZERO,
            FrameRate::Fps(fps) => Duration::from_secs_f64(1.0 / fps as f64),
        }
    }

    /// Check if pacing is needed
    pub fn is_paced(self) -> bool {
        !self.frame_interval().is_zero()
    }
}

impl From<u32> for FrameRate {
    fn from(fps: u32) -> Self {
        if fps == 0 { FrameRate::Unpaced } else { FrameRate::Fps(fps) }
    }
}

impl From<FrameRate> for u32 {
    fn from(rate: FrameRate) -> Self {
        match rate {
            FrameRate::Unpaced => 0,
            FrameRate::Fps(fps) => fps,
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        FrameRate::Fps(30)
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameRate::Unpaced => f.write_str("unpaced"),
            FrameRate::Fps(fps) => write!(f, "{} fps", fps),
        }
    }
}
