//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is assembled in layers, lowest precedence first:
//!
//! 1. [`ServerConfig::default`], suitable for local development.
//! 2. An optional TOML file, parsed into a [`FileConfig`] and applied with
//!    [`FileConfig::apply_to`].  Every field is optional so a file only needs
//!    to mention what it changes.
//! 3. CLI flags and `CAMSTREAM_*` environment variables (see `main.rs`).
//!
//! Example file:
//!
//! ```toml
//! bind_address = "127.0.0.1"
//! port = 6001
//! max_pending_writes = 256
//!
//! [test_pattern]
//! width = 640
//! height = 480
//! fps = 15
//! ```

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors produced while building a [`ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A bind address was not a valid IP address.
    #[error("invalid bind address: '{0}'")]
    InvalidAddress(String),

    /// A test pattern was not of the form `WxH@FPS`.
    #[error("invalid test pattern '{0}': expected WIDTHxHEIGHT@FPS with even, non-zero dimensions")]
    InvalidTestPattern(String),

    /// The queue bound must allow at least one pending write.
    #[error("max_pending_writes must be at least 1")]
    ZeroQueueBound,
}

/// Synthetic frame source settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TestPattern {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl TestPattern {
    fn validate(self) -> Option<Self> {
        let ok = self.width > 0
            && self.height > 0
            && self.width % 2 == 0
            && self.height % 2 == 0
            && self.fps > 0;
        ok.then_some(self)
    }

    /// Interval between generated frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps))
    }
}

impl FromStr for TestPattern {
    type Err = ConfigError;

    /// Parses `"640x480@30"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidTestPattern(s.to_string());
        let (size, fps) = s.split_once('@').ok_or_else(invalid)?;
        let (w, h) = size.split_once('x').ok_or_else(invalid)?;
        let pattern = TestPattern {
            width: w.trim().parse().map_err(|_| invalid())?,
            height: h.trim().parse().map_err(|_| invalid())?,
            fps: fps.trim().parse().map_err(|_| invalid())?,
        };
        pattern.validate().ok_or_else(invalid)
    }
}

/// All runtime configuration for the streaming server.
///
/// Build this once at startup and share it by reference or `Arc`.
///
/// # Example
///
/// ```rust
/// use camstream_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 6001);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// The address and port the WebSocket server binds to.
    pub bind_addr: SocketAddr,

    /// WebSocket subprotocol echoed back when the consumer offers it.
    ///
    /// Browsers abort the handshake if they request a subprotocol the server
    /// does not confirm, so this must match the consumer page.
    pub subprotocol: String,

    /// Upper bound on messages waiting in the write queue.
    ///
    /// Submissions that would exceed it are rejected with `QueueFull`
    /// instead of growing memory without limit while no consumer drains.
    pub max_pending_writes: usize,

    /// How long the frame publisher waits for both planes of a frame to be
    /// confirmed before it gives up on them and allows the next frame.
    pub stale_send_after: Duration,

    /// Run the built-in synthetic frame source instead of a real camera.
    pub test_pattern: Option<TestPattern>,
}

impl Default for ServerConfig {
    /// | Field              | Default             |
    /// |--------------------|---------------------|
    /// | bind_addr          | `0.0.0.0:6001`      |
    /// | subprotocol        | `jsbridge-protocol` |
    /// | max_pending_writes | 512                 |
    /// | stale_send_after   | 1 second            |
    /// | test_pattern       | none                |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 6001)),
            subprotocol: "jsbridge-protocol".to_string(),
            max_pending_writes: 512,
            stale_send_after: Duration::from_secs(1),
            test_pattern: None,
        }
    }
}

/// The on-disk TOML representation of the configuration.
///
/// Every field is optional; absent fields leave the lower layer untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub subprotocol: Option<String>,
    pub max_pending_writes: Option<usize>,
    pub stale_send_after_ms: Option<u64>,
    pub test_pattern: Option<TestPattern>,
}

impl FileConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overlays the fields present in this file onto `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address, queue bound, or test pattern
    /// is invalid.  `config` is left unchanged in that case.
    pub fn apply_to(&self, config: &mut ServerConfig) -> Result<(), ConfigError> {
        let mut next = config.clone();

        if let Some(addr) = &self.bind_address {
            let ip: IpAddr = addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(addr.clone()))?;
            next.bind_addr.set_ip(ip);
        }
        if let Some(port) = self.port {
            next.bind_addr.set_port(port);
        }
        if let Some(protocol) = &self.subprotocol {
            next.subprotocol = protocol.clone();
        }
        if let Some(bound) = self.max_pending_writes {
            if bound == 0 {
                return Err(ConfigError::ZeroQueueBound);
            }
            next.max_pending_writes = bound;
        }
        if let Some(ms) = self.stale_send_after_ms {
            next.stale_send_after = Duration::from_millis(ms);
        }
        if let Some(pattern) = self.test_pattern {
            let valid = pattern.validate().ok_or_else(|| {
                ConfigError::InvalidTestPattern(format!(
                    "{}x{}@{}",
                    pattern.width, pattern.height, pattern.fps
                ))
            })?;
            next.test_pattern = Some(valid);
        }

        *config = next;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_6001() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr.port(), 6001);
    }

    #[test]
    fn test_default_subprotocol_matches_consumer_page() {
        assert_eq!(ServerConfig::default().subprotocol, "jsbridge-protocol");
    }

    #[test]
    fn test_default_queue_bound_is_512() {
        assert_eq!(ServerConfig::default().max_pending_writes, 512);
    }

    #[test]
    fn test_default_stale_send_after_is_one_second() {
        assert_eq!(ServerConfig::default().stale_send_after, Duration::from_secs(1));
    }

    #[test]
    fn test_file_config_overrides_only_present_fields() {
        // Arrange
        let file = FileConfig::from_toml_str(
            r#"
            bind_address = "127.0.0.1"
            max_pending_writes = 64
            "#,
        )
        .unwrap();
        let mut cfg = ServerConfig::default();

        // Act
        file.apply_to(&mut cfg).unwrap();

        // Assert
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:6001");
        assert_eq!(cfg.max_pending_writes, 64);
        assert_eq!(cfg.subprotocol, "jsbridge-protocol", "untouched field keeps default");
    }

    #[test]
    fn test_file_config_with_test_pattern_table() {
        let file = FileConfig::from_toml_str(
            r#"
            [test_pattern]
            width = 320
            height = 240
            fps = 10
            "#,
        )
        .unwrap();
        let mut cfg = ServerConfig::default();
        file.apply_to(&mut cfg).unwrap();
        assert_eq!(
            cfg.test_pattern,
            Some(TestPattern {
                width: 320,
                height: 240,
                fps: 10
            })
        );
    }

    #[test]
    fn test_file_config_rejects_unknown_key() {
        let result = FileConfig::from_toml_str("colour = \"blue\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_file_config_invalid_address_leaves_config_unchanged() {
        // Arrange
        let file = FileConfig {
            bind_address: Some("not.an.ip".to_string()),
            port: Some(9000),
            ..FileConfig::default()
        };
        let mut cfg = ServerConfig::default();

        // Act
        let result = file.apply_to(&mut cfg);

        // Assert
        assert!(matches!(result, Err(ConfigError::InvalidAddress(_))));
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_file_config_zero_queue_bound_is_rejected() {
        let file = FileConfig {
            max_pending_writes: Some(0),
            ..FileConfig::default()
        };
        let result = file.apply_to(&mut ServerConfig::default());
        assert!(matches!(result, Err(ConfigError::ZeroQueueBound)));
    }

    #[test]
    fn test_test_pattern_parses() {
        let p: TestPattern = "640x480@30".parse().unwrap();
        assert_eq!((p.width, p.height, p.fps), (640, 480, 30));
    }

    #[test]
    fn test_test_pattern_rejects_odd_dimensions() {
        assert!("641x480@30".parse::<TestPattern>().is_err());
    }

    #[test]
    fn test_test_pattern_rejects_missing_fps() {
        assert!("640x480".parse::<TestPattern>().is_err());
    }

    #[test]
    fn test_test_pattern_frame_interval() {
        let p: TestPattern = "2x2@4".parse().unwrap();
        assert_eq!(p.frame_interval(), Duration::from_millis(250));
    }
}
