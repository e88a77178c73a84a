//! Readiness multiplexing for the relay loop
//!
//! [`wait_fd`] is the `poll(2)` primitive sinks backed by a file descriptor
//! use to implement [`DeviceSink::wait_for_readiness`]. [`EventMultiplexer`]
//! sits on top of any sink and turns raw wait results into loop decisions
//! according to the configured [`TimeoutPolicy`].

use std::time::Duration;
use tracing::{debug, error, trace, warn};

use crate::config::TimeoutPolicy;
use crate::sink::{DeviceSink, Readiness, WaitResult};
use crate::{RelayError, Result};

/// Poll `fd` for output-buffer availability and exceptional conditions.
///
/// `POLLOUT` maps to writable and `POLLPRI` to error-pending, as `select(2)`
/// reports them in its write and except sets. `POLLERR` also counts as
/// writable so the following dequeue surfaces the device error; `POLLNVAL`
/// is a wait failure.
#[cfg(unix)]
pub fn wait_fd(fd: std::os::fd::BorrowedFd<'_>, timeout: Duration) -> Result<WaitResult> {
    use std::os::fd::AsRawFd;

    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let mut pfd = libc::pollfd { fd: fd.as_raw_fd(), events: libc::POLLOUT | libc::POLLPRI, revents: 0 };

    trace!(timeout_ms, fd = pfd.fd, "Polling device");
    // SAFETY: pfd is a single valid pollfd for the duration of the call.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };

    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(WaitResult::Interrupted);
        }
        return Err(RelayError::wait_failed(err));
    }
    if rc == 0 {
        return Ok(WaitResult::Timeout);
    }
    if pfd.revents & libc::POLLNVAL != 0 {
        return Err(RelayError::wait_failed(std::io::Error::from_raw_os_error(libc::EBADF)));
    }

    Ok(WaitResult::Ready(Readiness {
        writable: pfd.revents & (libc::POLLOUT | libc::POLLERR) != 0,
        error_pending: pfd.revents & libc::POLLPRI != 0,
    }))
}

/// Decision the loop takes after one wait
#[derive(Debug)]
pub enum WaitOutcome {
    /// Continue the iteration with these readiness conditions
    Proceed(Readiness),
    /// Timed out under a tolerant policy; continue with nothing ready
    TimedOut,
    /// Restart the wait immediately
    Restart,
    /// Stop the loop
    Fatal(RelayError),
}

/// Bounded readiness wait with a timeout policy
#[derive(Debug, Clone)]
pub struct EventMultiplexer {
    timeout: Duration,
    policy: TimeoutPolicy,
    consecutive_timeouts: u32,
}

impl EventMultiplexer {
    pub fn new(timeout: Duration, policy: TimeoutPolicy) -> Self {
        Self { timeout, policy, consecutive_timeouts: 0 }
    }

    /// Wait on `sink` once and classify the result.
    pub fn wait<S: DeviceSink + ?Sized>(&mut self, sink: &mut S) -> WaitOutcome {
        match sink.wait_for_readiness(self.timeout) {
            Ok(WaitResult::Ready(readiness)) => {
                self.consecutive_timeouts = 0;
                trace!(?readiness, "Device ready");
                WaitOutcome::Proceed(readiness)
            }
            Ok(WaitResult::Interrupted) => {
                debug!("Readiness wait interrupted, restarting");
                WaitOutcome::Restart
            }
            Ok(WaitResult::Timeout) => {
                self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
                if self.policy.is_fatal(self.consecutive_timeouts) {
                    error!(
                        consecutive = self.consecutive_timeouts,
                        "Select timeout on {}, stopping",
                        sink.name()
                    );
                    WaitOutcome::Fatal(RelayError::Timeout { duration: self.timeout })
                } else {
                    warn!(consecutive = self.consecutive_timeouts, "Select timeout on {}", sink.name());
                    WaitOutcome::TimedOut
                }
            }
            Err(RelayError::Wait { source }) if source.kind() == std::io::ErrorKind::Interrupted => {
                debug!("Readiness wait interrupted, restarting");
                WaitOutcome::Restart
            }
            Err(e) => {
                error!("Select error on {}: {}", sink.name(), e);
                WaitOutcome::Fatal(e)
            }
        }
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }
}
