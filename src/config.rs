//! Relay configuration.
//!
//! The core only reads its configuration. Values come from code or from a
//! YAML document such as:
//!
//! ```yaml
//! label: front-camera
//! fps: 30
//! show_fps: true
//! source_format: YUYV
//! frame_size: 614400
//! wait_timeout_ms: 1000
//! timeout_policy:
//!   policy: consecutive
//!   limit: 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::{FourCc, FrameRate};
use crate::{RelayError, Result};

/// What the loop does when a readiness wait times out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// A single timeout ends the loop
    #[default]
    Fatal,
    /// Timeouts are logged and the loop keeps waiting
    KeepWaiting,
    /// The loop ends after `limit` timeouts in a row
    Consecutive { limit: u32 },
}

impl TimeoutPolicy {
    /// Whether `consecutive` timeouts in a row end the loop
    pub fn is_fatal(self, consecutive: u32) -> bool {
        match self {
            TimeoutPolicy::Fatal => consecutive >= 1,
            TimeoutPolicy::KeepWaiting => false,
            TimeoutPolicy::Consecutive { limit } => consecutive >= limit,
        }
    }
}

/// Read-only configuration consumed by the relay loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Human-readable label for log lines
    pub label: String,

    /// Target frame rate
    pub fps: FrameRate,

    /// Count processed buffers and report FPS
    pub show_fps: bool,

    /// Source pixel format, diagnostics only
    pub source_format: FourCc,

    /// Bytes per source frame, also the slot capacity
    pub frame_size: usize,

    /// Bound on each readiness wait
    #[serde(rename = "wait_timeout_ms", with = "millis")]
    pub wait_timeout: Duration,

    /// Delay before each wait to avoid spinning
    #[serde(rename = "idle_delay_ms", with = "millis")]
    pub idle_delay: Duration,

    pub timeout_policy: TimeoutPolicy,

    /// How often the FPS reporter logs
    #[serde(rename = "fps_report_interval_ms", with = "millis")]
    pub fps_report_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            label: "uvcrelay".to_string(),
            fps: FrameRate::default(),
            show_fps: false,
            source_format: FourCc::default(),
            // 640x480 YUYV
            frame_size: 640 * 480 * 2,
            wait_timeout: Duration::from_secs(1),
            idle_delay: Duration::from_millis(1),
            timeout_policy: TimeoutPolicy::default(),
            fps_report_interval: Duration::from_secs(1),
        }
    }
}

impl RelayConfig {
    /// Parse and validate a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RelayConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| RelayError::ConfigFile { path: path.to_path_buf(), source })?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(RelayError::config_invalid("frame_size must be non-zero"));
        }
        if u32::try_from(self.frame_size).is_err() {
            return Err(RelayError::config_invalid("frame_size must fit in 32 bits"));
        }
        if self.wait_timeout.is_zero() {
            return Err(RelayError::config_invalid("wait_timeout_ms must be non-zero"));
        }
        if let TimeoutPolicy::Consecutive { limit: 0 } = self.timeout_policy {
            return Err(RelayError::config_invalid("consecutive timeout limit must be non-zero"));
        }
        if self.fps_report_interval.is_zero() {
            return Err(RelayError::config_invalid("fps_report_interval_ms must be non-zero"));
        }
        Ok(())
    }

    /// Interval between permitted frame emissions
    pub fn frame_interval(&self) -> Duration {
        self.fps.frame_interval()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_fatal_on_timeout() {
        let config = RelayConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.wait_timeout, Duration::from_secs(1));
        assert_eq!(config.idle_delay, Duration::from_millis(1));
        assert_eq!(config.timeout_policy, TimeoutPolicy::Fatal);
    }

    #[test]
    fn parses_full_document() {
        let yaml = r#"
label: front-camera
fps: 25
show_fps: true
source_format: MJPG
frame_size: 4096
wait_timeout_ms: 500
idle_delay_ms: 2
timeout_policy:
  policy: consecutive
  limit: 5
fps_report_interval_ms: 2000
"#;
        let config = RelayConfig::from_yaml_str(yaml).expect("valid config");
        assert_eq!(config.label, "front-camera");
        assert_eq!(config.fps, FrameRate::Fps(25));
        assert!(config.show_fps);
        assert_eq!(config.source_format, FourCc::MJPG);
        assert_eq!(config.frame_size, 4096);
        assert_eq!(config.wait_timeout, Duration::from_millis(500));
        assert_eq!(config.idle_delay, Duration::from_millis(2));
        assert_eq!(config.timeout_policy, TimeoutPolicy::Consecutive { limit: 5 });
        assert_eq!(config.frame_interval(), Duration::from_millis(40));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = RelayConfig::from_yaml_str("fps: 0\n").expect("valid config");
        assert_eq!(config.fps, FrameRate::Unpaced);
        assert_eq!(config.frame_size, RelayConfig::default().frame_size);
    }

    #[test]
    fn keep_waiting_policy_parses() {
        let config = RelayConfig::from_yaml_str("timeout_policy:\n  policy: keep_waiting\n")
            .expect("valid config");
        assert_eq!(config.timeout_policy, TimeoutPolicy::KeepWaiting);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            RelayConfig::from_yaml_str("frame_size: 0\n"),
            Err(RelayError::Config { .. })
        ));
        assert!(matches!(
            RelayConfig::from_yaml_str("wait_timeout_ms: 0\n"),
            Err(RelayError::Config { .. })
        ));
        assert!(matches!(
            RelayConfig::from_yaml_str("timeout_policy:\n  policy: consecutive\n  limit: 0\n"),
            Err(RelayError::Config { .. })
        ));
        assert!(matches!(
            RelayConfig::from_yaml_str("source_format: YUV\n"),
            Err(RelayError::ConfigParse { .. })
        ));
        assert!(matches!(
            RelayConfig::from_yaml_str("bogus_key: 1\n"),
            Err(RelayError::ConfigParse { .. })
        ));
    }

    #[test]
    fn zero_report_interval_is_rejected_without_show_fps() {
        for yaml in ["fps_report_interval_ms: 0\n", "show_fps: true\nfps_report_interval_ms: 0\n"] {
            assert!(
                matches!(RelayConfig::from_yaml_str(yaml), Err(RelayError::Config { .. })),
                "{yaml:?} should be rejected"
            );
        }
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn frame_size_beyond_device_field_is_rejected() {
        let config =
            RelayConfig { frame_size: u32::MAX as usize + 1, ..RelayConfig::default() };
        assert!(matches!(config.validate(), Err(RelayError::Config { .. })));

        let largest = RelayConfig { frame_size: u32::MAX as usize, ..RelayConfig::default() };
        largest.validate().expect("u32::MAX fits");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = RelayConfig::from_path("/nonexistent/uvcrelay.yaml").expect_err("missing file");
        match err {
            RelayError::ConfigFile { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/uvcrelay.yaml"));
            }
            other => panic!("Expected ConfigFile error, got {other:?}"),
        }
    }

    #[test]
    fn timeout_policy_thresholds() {
        assert!(TimeoutPolicy::Fatal.is_fatal(1));
        assert!(!TimeoutPolicy::KeepWaiting.is_fatal(u32::MAX));
        let three = TimeoutPolicy::Consecutive { limit: 3 };
        assert!(!three.is_fatal(2));
        assert!(three.is_fatal(3));
    }

    #[test]
    fn serializes_back_to_yaml() {
        let config = RelayConfig::default();
        let yaml = serde_yaml_ng::to_string(&config).expect("serialize");
        assert!(yaml.contains("wait_timeout_ms: 1000"));
        assert_eq!(RelayConfig::from_yaml_str(&yaml).expect("round trip"), config);
    }
}
