//! Error types for the frame relay.
//!
//! Every fallible operation in the crate returns [`RelayError`]. Device I/O
//! failures carry the underlying [`std::io::Error`] so the errno survives into
//! the log line, and each variant knows whether retrying can help.
//!
//! ## Error Categories
//!
//! - **Device Errors**: opening or configuring the video output node
//! - **Queue Errors**: dequeue/queue failures on the device buffer ring
//! - **Wait Errors**: the readiness wait primitive failed or timed out
//! - **Configuration Errors**: invalid or unreadable relay configuration
//! - **Slot Errors**: illegal buffer slot transitions
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use uvcrelay::RelayError;
//!
//! let error = RelayError::dequeue_failed(std::io::Error::from_raw_os_error(11));
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Main error type for relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Device operation '{operation}' failed")]
    Device {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to dequeue buffer")]
    Dequeue {
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to queue buffer {index}")]
    Queue {
        index: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Readiness wait failed")]
    Wait {
        #[source]
        source: std::io::Error,
    },

    #[error("No device activity within {duration:?}")]
    Timeout { duration: Duration },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration parse error")]
    ConfigParse {
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Buffer slot violation: {reason}")]
    Slot { reason: String },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },
}

impl RelayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Dequeue { .. } => true,
            RelayError::Queue { .. } => true,
            RelayError::Timeout { .. } => true,
            RelayError::Wait { source } => source.kind() == std::io::ErrorKind::Interrupted,
            RelayError::Device { .. } => false,
            RelayError::Config { .. } => false,
            RelayError::ConfigFile { .. } => false,
            RelayError::ConfigParse { .. } => false,
            RelayError::Slot { .. } => false,
            RelayError::UnsupportedPlatform { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RelayError::Device { .. } => vec![
                "Check that the UVC gadget function is bound to a UDC",
                "Verify the video node path and permissions",
                "Confirm the node is a video output device",
            ],
            RelayError::Dequeue { .. } | RelayError::Queue { .. } => vec![
                "Wait for the host to start streaming",
                "Check that buffers were requested with USERPTR memory",
                "Verify the frame size matches the negotiated format",
            ],
            RelayError::Wait { .. } => vec![
                "Check that the device file descriptor is still open",
                "Restart the relay",
            ],
            RelayError::Timeout { .. } => vec![
                "Increase the wait timeout",
                "Use a non-fatal timeout policy for idle-tolerant operation",
                "Verify the USB host is connected",
            ],
            RelayError::Config { .. } | RelayError::ConfigParse { .. } => vec![
                "Check configuration field names and value ranges",
                "Compare against the documented defaults",
            ],
            RelayError::ConfigFile { .. } => vec![
                "Check the configuration file exists and is readable",
                "Check file permissions",
            ],
            RelayError::Slot { .. } => vec![
                "Only write the slot while it awaits refill",
                "Never report more bytes than the slot capacity",
            ],
            RelayError::UnsupportedPlatform { .. } => vec![
                "Run on Linux with a UVC gadget configured",
                "Use a custom DeviceSink implementation for testing",
            ],
        }
    }

    /// Helper constructor for device errors with operation context.
    pub fn device_error(operation: impl Into<String>, source: std::io::Error) -> Self {
        RelayError::Device { operation: operation.into(), source }
    }

    /// Helper constructor for dequeue failures.
    pub fn dequeue_failed(source: std::io::Error) -> Self {
        RelayError::Dequeue { source }
    }

    /// Helper constructor for queue failures.
    pub fn queue_failed(index: u32, source: std::io::Error) -> Self {
        RelayError::Queue { index, source }
    }

    /// Helper constructor for wait primitive failures.
    pub fn wait_failed(source: std::io::Error) -> Self {
        RelayError::Wait { source }
    }

    /// Helper constructor for configuration validation errors.
    pub fn config_invalid(reason: impl Into<String>) -> Self {
        RelayError::Config { reason: reason.into() }
    }

    /// Helper constructor for buffer slot violations.
    pub fn slot_violation(reason: impl Into<String>) -> Self {
        RelayError::Slot { reason: reason.into() }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        RelayError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Device { operation: "<unknown>".to_string(), source: err }
    }
}

impl From<serde_yaml_ng::Error> for RelayError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        RelayError::ConfigParse { source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_messages_carry_context(
                reason in ".*",
                operation in "\\w+",
                index in 0u32..32u32,
                duration_ms in 1u64..60000u64
            ) {
                let config_error = RelayError::config_invalid(reason.clone());
                prop_assert!(config_error.to_string().contains(&reason));

                let device_error = RelayError::device_error(operation.clone(), io::Error::other("x"));
                prop_assert!(device_error.to_string().contains(&operation));

                let queue_error = RelayError::queue_failed(index, io::Error::other("x"));
                prop_assert!(queue_error.to_string().contains(&index.to_string()));

                let timeout_error = RelayError::Timeout { duration: Duration::from_millis(duration_ms) };
                prop_assert!(!timeout_error.to_string().is_empty());
            }

            #[test]
            fn io_source_is_preserved(errno in 1i32..130i32) {
                let err = RelayError::dequeue_failed(io::Error::from_raw_os_error(errno));
                let source = std::error::Error::source(&err).expect("dequeue error has a source");
                let io_err = source.downcast_ref::<io::Error>().expect("source is io::Error");
                prop_assert_eq!(io_err.raw_os_error(), Some(errno));
            }
        }
    }

    #[test]
    fn transient_device_errors_are_retryable() {
        assert!(RelayError::dequeue_failed(io::Error::from_raw_os_error(libc::EAGAIN)).is_retryable());
        assert!(RelayError::queue_failed(0, io::Error::from_raw_os_error(libc::EINVAL)).is_retryable());
        assert!(!RelayError::config_invalid("fps").is_retryable());
        assert!(!RelayError::slot_violation("double fill").is_retryable());
    }

    #[test]
    fn interrupted_wait_is_retryable_other_wait_failures_are_not() {
        let interrupted = RelayError::wait_failed(io::Error::from(io::ErrorKind::Interrupted));
        let bad_fd = RelayError::wait_failed(io::Error::from_raw_os_error(libc::EBADF));
        assert!(interrupted.is_retryable());
        assert!(!bad_fd.is_retryable());
    }

    #[test]
    fn every_variant_has_suggestions() {
        let errors = [
            RelayError::device_error("VIDIOC_REQBUFS", io::Error::other("x")),
            RelayError::dequeue_failed(io::Error::other("x")),
            RelayError::wait_failed(io::Error::other("x")),
            RelayError::Timeout { duration: Duration::from_secs(1) },
            RelayError::config_invalid("x"),
            RelayError::slot_violation("x"),
            RelayError::unsupported_platform("UVC output", "Linux"),
        ];
        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty(), "{error} has no suggestions");
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<RelayError>();
    }

    #[test]
    fn from_io_error_maps_to_device() {
        let err: RelayError = io::Error::new(io::ErrorKind::NotFound, "no node").into();
        match err {
            RelayError::Device { operation, source } => {
                assert_eq!(operation, "<unknown>");
                assert_eq!(source.to_string(), "no node");
            }
            other => panic!("Expected Device error, got {other:?}"),
        }
    }
}
