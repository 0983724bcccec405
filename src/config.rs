//! Receiver configuration
//!
//! Settings come from, in increasing priority:
//! 1. built-in defaults
//! 2. a JSON file named by `UDPCAM_CONFIG` (any subset of fields)
//! 3. `UDPCAM_*` environment variables
//!
//! | Variable | Field |
//! |---|---|
//! | `UDPCAM_BIND` | `bind` |
//! | `UDPCAM_MAX_DATAGRAM_SIZE` | `max_datagram_size` |
//! | `UDPCAM_POLL_TIMEOUT_MS` | `poll_timeout_ms` |
//! | `UDPCAM_WIDTH` / `UDPCAM_HEIGHT` / `UDPCAM_FPS` | sink format |
//! | `UDPCAM_PIXEL_FORMAT` | `pixel_format` (`rgb24`, `bgr24`, `yuyv`) |
//! | `UDPCAM_OUTPUT` | `output` (`-` for stdout) |
//! | `UDPCAM_FRAME_VALIDATION` | `validation` (`strict`, `minimal`, `off`) |
//! | `UDPCAM_CAPTURE` / `UDPCAM_REPLAY` | capture / replay file |
//! | `UDPCAM_REPLAY_SPEED` | `replay_speed` |
//! | `UDPCAM_STATS_INTERVAL` | `stats_interval` |

use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::color_conversion::PixelFormat;
use crate::fragment_header::{DEFAULT_MAX_DATAGRAM_SIZE, HEADER_LEN};
use crate::frame_validation::ValidationLevel;
use crate::receiver::DEFAULT_STATS_INTERVAL;
use crate::sink::SinkFormat;

/// Environment variable naming the JSON config file
pub const CONFIG_FILE_VAR: &str = "UDPCAM_CONFIG";

/// Largest payload a UDP datagram can carry over IPv4
const MAX_UDP_PAYLOAD: usize = 65_507;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`ReceiverConfig`].
    #[error("invalid config file {path}: {source}")]
    Json {
        /// Config file path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// An environment variable could not be parsed.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// Parse failure.
        reason: String,
    },

    /// The merged configuration is unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything the receiver needs to start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverConfig {
    /// UDP address to listen on
    pub bind: String,
    /// Receive buffer size; longer datagrams are truncated
    pub max_datagram_size: usize,
    /// Longest a single receive blocks before the stop flag is checked
    pub poll_timeout_ms: u64,
    /// Sink width in pixels
    pub width: u32,
    /// Sink height in pixels
    pub height: u32,
    /// Sink frame rate
    pub fps: u32,
    /// Sink pixel layout
    pub pixel_format: PixelFormat,
    /// Sink output: `-` for stdout, otherwise a file or device path
    pub output: String,
    /// Pre-decode validation level
    pub validation: ValidationLevel,
    /// Record received datagrams to this file
    pub capture_path: Option<PathBuf>,
    /// Read datagrams from this capture instead of the network
    pub replay_path: Option<PathBuf>,
    /// Replay speed multiplier (0 = as fast as possible)
    pub replay_speed: f64,
    /// Completed frames between stats log lines (0 disables)
    pub stats_interval: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            poll_timeout_ms: 500,
            width: 1280,
            height: 720,
            fps: 30,
            pixel_format: PixelFormat::Rgb24,
            output: "-".to_string(),
            validation: ValidationLevel::Minimal,
            capture_path: None,
            replay_path: None,
            replay_speed: 1.0,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl ReceiverConfig {
    /// Load from `UDPCAM_CONFIG` and the process environment, then validate
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file or a variable cannot be parsed,
    /// or the result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Same as [`ReceiverConfig::load`] with a custom variable lookup
    ///
    /// # Errors
    ///
    /// See [`ReceiverConfig::load`].
    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_FILE_VAR) {
            Some(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file; missing fields keep their defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Json`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&json).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `UDPCAM_*` overrides
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparseable values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("UDPCAM_BIND") {
            self.bind = v.trim().to_string();
        }
        if let Some(v) = lookup("UDPCAM_MAX_DATAGRAM_SIZE") {
            self.max_datagram_size = parse_var("UDPCAM_MAX_DATAGRAM_SIZE", &v)?;
        }
        if let Some(v) = lookup("UDPCAM_POLL_TIMEOUT_MS") {
            self.poll_timeout_ms = parse_var("UDPCAM_POLL_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("UDPCAM_WIDTH") {
            self.width = parse_var("UDPCAM_WIDTH", &v)?;
        }
        if let Some(v) = lookup("UDPCAM_HEIGHT") {
            self.height = parse_var("UDPCAM_HEIGHT", &v)?;
        }
        if let Some(v) = lookup("UDPCAM_FPS") {
            self.fps = parse_var("UDPCAM_FPS", &v)?;
        }
        if let Some(v) = lookup("UDPCAM_PIXEL_FORMAT") {
            self.pixel_format = parse_var("UDPCAM_PIXEL_FORMAT", &v)?;
        }
        if let Some(v) = lookup("UDPCAM_OUTPUT") {
            self.output = v.trim().to_string();
        }
        if let Some(v) = lookup("UDPCAM_FRAME_VALIDATION") {
            self.validation = ValidationLevel::from_env_str(v.trim());
        }
        if let Some(v) = lookup("UDPCAM_CAPTURE") {
            self.capture_path = Some(v.trim()).filter(|s| !s.is_empty()).map(PathBuf::from);
        }
        if let Some(v) = lookup("UDPCAM_REPLAY") {
            self.replay_path = Some(v.trim()).filter(|s| !s.is_empty()).map(PathBuf::from);
        }
        if let Some(v) = lookup("UDPCAM_REPLAY_SPEED") {
            self.replay_speed = parse_var("UDPCAM_REPLAY_SPEED", &v)?;
        }
        if let Some(v) = lookup("UDPCAM_STATS_INTERVAL") {
            self.stats_interval = parse_var("UDPCAM_STATS_INTERVAL", &v)?;
        }
        Ok(())
    }

    /// Check the merged configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.replay_path.is_none() {
            match self.bind.to_socket_addrs().map(|mut addrs| addrs.next()) {
                Ok(Some(_)) => {}
                Ok(None) => return invalid(format!("bind address '{}' resolves to nothing", self.bind)),
                Err(e) => return invalid(format!("bind address '{}': {}", self.bind, e)),
            }
        }
        if self.max_datagram_size <= HEADER_LEN || self.max_datagram_size > MAX_UDP_PAYLOAD {
            return invalid(format!(
                "max_datagram_size must be in {}..={}, got {}",
                HEADER_LEN + 1,
                MAX_UDP_PAYLOAD,
                self.max_datagram_size
            ));
        }
        if self.poll_timeout_ms == 0 {
            return invalid("poll_timeout_ms must be non-zero".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return invalid(format!(
                "sink resolution must be non-zero, got {}x{}",
                self.width, self.height
            ));
        }
        if self.fps == 0 {
            return invalid("fps must be non-zero".to_string());
        }
        if self.pixel_format == PixelFormat::Yuyv && self.width % 2 != 0 {
            return invalid(format!("yuyv needs an even width, got {}", self.width));
        }
        if self.output.is_empty() {
            return invalid("output must be '-' or a path".to_string());
        }
        if !self.replay_speed.is_finite() || self.replay_speed < 0.0 {
            return invalid(format!(
                "replay_speed must be a non-negative number, got {}",
                self.replay_speed
            ));
        }
        Ok(())
    }

    /// Receive poll timeout
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Sink format described by this configuration
    pub fn sink_format(&self) -> SinkFormat {
        SinkFormat {
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format,
            fps: self.fps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ReceiverConfig::load_from(env(&[])).unwrap();
        assert_eq!(config, ReceiverConfig::default());
        assert_eq!(config.bind, "0.0.0.0:8000");
        assert_eq!(config.max_datagram_size, 1200);
        assert_eq!(config.poll_timeout(), Duration::from_millis(500));
        assert_eq!(config.sink_format().frame_size(), 1280 * 720 * 3);
        assert_eq!(config.validation, ValidationLevel::Minimal);
    }

    #[test]
    fn test_env_overrides() {
        let config = ReceiverConfig::load_from(env(&[
            ("UDPCAM_BIND", "127.0.0.1:9000"),
            ("UDPCAM_WIDTH", "640"),
            ("UDPCAM_HEIGHT", " 480 "),
            ("UDPCAM_FPS", "15"),
            ("UDPCAM_PIXEL_FORMAT", "YUYV"),
            ("UDPCAM_OUTPUT", "/dev/video10"),
            ("UDPCAM_FRAME_VALIDATION", "strict"),
            ("UDPCAM_CAPTURE", "/tmp/rx.bin"),
            ("UDPCAM_STATS_INTERVAL", "0"),
        ]))
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!((config.width, config.height, config.fps), (640, 480, 15));
        assert_eq!(config.pixel_format, PixelFormat::Yuyv);
        assert_eq!(config.output, "/dev/video10");
        assert_eq!(config.validation, ValidationLevel::Strict);
        assert_eq!(config.capture_path, Some(PathBuf::from("/tmp/rx.bin")));
        assert_eq!(config.stats_interval, 0);
    }

    #[test]
    fn test_unparseable_env_value() {
        let err = ReceiverConfig::load_from(env(&[("UDPCAM_FPS", "fast")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, "UDPCAM_FPS");
                assert_eq!(value, "fast");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unknown_pixel_format() {
        let result = ReceiverConfig::load_from(env(&[("UDPCAM_PIXEL_FORMAT", "nv12")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("udpcam.json");
        std::fs::write(
            &path,
            r#"{ "bind": "127.0.0.1:7000", "fps": 10, "pixel_format": "bgr24", "validation": "off" }"#,
        )
        .unwrap();

        let path_str = path.to_str().unwrap();
        let config = ReceiverConfig::load_from(env(&[
            ("UDPCAM_CONFIG", path_str),
            ("UDPCAM_FPS", "25"),
        ]))
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:7000");
        assert_eq!(config.fps, 25);
        assert_eq!(config.pixel_format, PixelFormat::Bgr24);
        assert_eq!(config.validation, ValidationLevel::Off);
        assert_eq!(config.width, 1280);
    }

    #[test]
    fn test_file_unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("udpcam.json");
        std::fs::write(&path, r#"{ "port": 8000 }"#).unwrap();

        assert!(matches!(
            ReceiverConfig::from_file(&path),
            Err(ConfigError::Json { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = ReceiverConfig::load_from(env(&[("UDPCAM_CONFIG", "/nonexistent/udpcam.json")]));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_validation_failures() {
        let cases: Vec<(&str, &str)> = vec![
            ("UDPCAM_MAX_DATAGRAM_SIZE", "6"),
            ("UDPCAM_MAX_DATAGRAM_SIZE", "70000"),
            ("UDPCAM_POLL_TIMEOUT_MS", "0"),
            ("UDPCAM_WIDTH", "0"),
            ("UDPCAM_FPS", "0"),
            ("UDPCAM_BIND", "not an address"),
            ("UDPCAM_REPLAY_SPEED", "-1"),
            ("UDPCAM_OUTPUT", ""),
        ];

        for (key, value) in cases {
            let result = ReceiverConfig::load_from(env(&[(key, value)]));
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "{}={} should be invalid",
                key,
                value
            );
        }
    }

    #[test]
    fn test_bind_addresses_that_resolve_are_valid() {
        for bind in ["127.0.0.1:0", "0.0.0.0:8000", "[::1]:9000"] {
            let config = ReceiverConfig {
                bind: bind.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "{} should be valid", bind);
        }
    }

    #[test]
    fn test_yuyv_odd_width_invalid() {
        let result = ReceiverConfig::load_from(env(&[
            ("UDPCAM_PIXEL_FORMAT", "yuyv"),
            ("UDPCAM_WIDTH", "641"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_replay_skips_bind_check() {
        let config = ReceiverConfig::load_from(env(&[
            ("UDPCAM_BIND", ""),
            ("UDPCAM_REPLAY", "/tmp/session.bin"),
            ("UDPCAM_REPLAY_SPEED", "0"),
        ]))
        .unwrap();
        assert_eq!(config.replay_path, Some(PathBuf::from("/tmp/session.bin")));
        assert_eq!(config.replay_speed, 0.0);
    }

    #[test]
    fn test_serialized_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("udpcam.json");
        let config = ReceiverConfig {
            fps: 60,
            pixel_format: PixelFormat::Yuyv,
            ..Default::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(ReceiverConfig::from_file(&path).unwrap(), config);
    }
}
