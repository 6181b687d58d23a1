//! Runtime configuration for the vboard server.
//!
//! Settings come from three layers, lowest precedence first:
//!
//! 1. [`ServerConfig::default`],
//! 2. an optional TOML file (see [`ConfigFile`]),
//! 3. command-line flags and environment variables (applied in `main.rs`).
//!
//! A config file only needs the keys it wants to change:
//!
//! ```toml
//! log_level = "debug"
//!
//! [network]
//! bind_address = "0.0.0.0:7000"
//!
//! [session]
//! read_timeout_secs = 30
//! max_payload_len = 4096
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The bind address is not a valid `ip:port` pair.
    #[error("invalid bind address {value:?}: {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// A zero read timeout would drop every connection immediately.
    #[error("read timeout must be greater than zero")]
    ZeroReadTimeout,
}

// ── Runtime config ────────────────────────────────────────────────────────────

/// Fully resolved settings consumed by the server and protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP address the accept loop listens on.
    pub bind_addr: SocketAddr,
    /// Maximum silence allowed while waiting for the next frame.
    pub read_timeout: Duration,
    /// Largest payload a single frame may declare.
    pub max_payload_len: u32,
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], default_port())),
            read_timeout: Duration::from_secs(default_read_timeout_secs()),
            max_payload_len: default_max_payload_len(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Loads the file at `path` if one is given, otherwise returns defaults.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] raised while reading, parsing, or validating the file.
    /// An explicitly named file that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => load_config_file(path)?.into_server_config(),
            None => Ok(Self::default()),
        }
    }
}

// ── File schema ───────────────────────────────────────────────────────────────

/// On-disk form of the configuration.  Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigFile {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkSection {
    /// `ip:port` to listen on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Per-connection limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSection {
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: u32,
}

fn default_port() -> u16 {
    65535
}
fn default_bind_address() -> String {
    format!("127.0.0.1:{}", default_port())
}
fn default_read_timeout_secs() -> u64 {
    10
}
fn default_max_payload_len() -> u32 {
    64 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            network: NetworkSection::default(),
            session: SessionSection::default(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            read_timeout_secs: default_read_timeout_secs(),
            max_payload_len: default_max_payload_len(),
        }
    }
}

impl ConfigFile {
    /// Parses a config file from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validates the file contents and converts them into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] for an unparsable bind address
    /// and [`ConfigError::ZeroReadTimeout`] for a zero timeout.
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let bind_addr = parse_bind_addr(&self.network.bind_address)?;
        if self.session.read_timeout_secs == 0 {
            return Err(ConfigError::ZeroReadTimeout);
        }
        Ok(ServerConfig {
            bind_addr,
            read_timeout: Duration::from_secs(self.session.read_timeout_secs),
            max_payload_len: self.session.max_payload_len,
            log_level: self.log_level,
        })
    }
}

/// Reads and parses the config file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if its TOML is malformed.
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigFile::from_toml_str(&content)
}

/// Parses an `ip:port` bind address.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidAddress`] when `value` is not a socket address.
pub fn parse_bind_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|source| ConfigError::InvalidAddress {
        value: value.to_string(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listens_on_loopback_65535() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr, "127.0.0.1:65535".parse().unwrap());
    }

    #[test]
    fn test_default_limits() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.read_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_payload_len, 65536);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_load_without_path_returns_defaults() {
        assert_eq!(ServerConfig::load(None).unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        // Arrange / Act
        let cfg = ConfigFile::from_toml_str("")
            .unwrap()
            .into_server_config()
            .unwrap();

        // Assert
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_only_named_keys() {
        // Arrange
        let toml = r#"
            [session]
            read_timeout_secs = 3
        "#;

        // Act
        let cfg = ConfigFile::from_toml_str(toml)
            .unwrap()
            .into_server_config()
            .unwrap();

        // Assert
        assert_eq!(cfg.read_timeout, Duration::from_secs(3));
        assert_eq!(cfg.max_payload_len, 65536);
        assert_eq!(cfg.bind_addr, ServerConfig::default().bind_addr);
    }

    #[test]
    fn test_full_file_is_applied() {
        let toml = r#"
            log_level = "debug"

            [network]
            bind_address = "0.0.0.0:7000"

            [session]
            read_timeout_secs = 30
            max_payload_len = 4096
        "#;

        let cfg = ConfigFile::from_toml_str(toml)
            .unwrap()
            .into_server_config()
            .unwrap();

        assert_eq!(cfg.bind_addr, "0.0.0.0:7000".parse().unwrap());
        assert_eq!(cfg.read_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_payload_len, 4096);
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = ConfigFile::from_toml_str("[network\nbind_address = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let file = ConfigFile {
            network: NetworkSection {
                bind_address: "localhost".to_string(),
            },
            ..ConfigFile::default()
        };

        let err = file.into_server_config().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { ref value, .. } if value == "localhost"));
    }

    #[test]
    fn test_zero_read_timeout_is_rejected() {
        let file = ConfigFile {
            session: SessionSection {
                read_timeout_secs: 0,
                ..SessionSection::default()
            },
            ..ConfigFile::default()
        };

        assert!(matches!(
            file.into_server_config(),
            Err(ConfigError::ZeroReadTimeout)
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let path = std::env::temp_dir().join("vboard-config-that-does-not-exist.toml");
        let err = ServerConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_reads_file_from_disk() {
        // Arrange
        let path = std::env::temp_dir().join(format!("vboard-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[network]\nbind_address = \"127.0.0.1:4000\"\n").unwrap();

        // Act
        let cfg = ServerConfig::load(Some(&path));
        let _ = std::fs::remove_file(&path);

        // Assert
        assert_eq!(cfg.unwrap().bind_addr, "127.0.0.1:4000".parse().unwrap());
    }

    #[test]
    fn test_config_file_round_trips_through_toml() {
        let mut file = ConfigFile::default();
        file.session.max_payload_len = 128;

        let text = toml::to_string_pretty(&file).expect("serialize");
        let restored = ConfigFile::from_toml_str(&text).expect("deserialize");

        assert_eq!(file, restored);
    }
}
