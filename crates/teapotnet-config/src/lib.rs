//! Typed TOML configuration for the Teapotnet core engine
//! (`SPEC_FULL.md` §6 "Configuration").
//!
//! This is deliberately a thin `serde` + `toml` layer rather than
//! `tor-config`'s builder-macro machinery: one `Deserialize` struct
//! per logical group, defaulted field-by-field, loaded with
//! [`load`]. There is no live-reload or multi-source layering here —
//! just enough to turn a file on disk into a typed, validated value.

mod err;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use url::Url;

pub use err::{ConfigError, Result};

fn project_dirs() -> Option<&'static ProjectDirs> {
    static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
        LazyLock::new(|| ProjectDirs::from("net", "teapotnet", "Teapotnet"));
    PROJECT_DIRS.as_ref()
}

fn default_cache_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".teapotnet/cache"))
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".teapotnet/data"))
}

fn default_port() -> u16 {
    0
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_stall_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_link_backoff_initial() -> Duration {
    Duration::from_secs(10)
}

fn default_link_backoff_max() -> Duration {
    Duration::from_secs(600)
}

fn default_publisher_cache_ttl() -> Duration {
    Duration::from_secs(10)
}

fn default_subscribe_collapse_window() -> Duration {
    Duration::from_secs(30)
}

/// Node identity material: the certificate and private key named in
/// `spec.md` §6 "Node certificate file".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// PEM file holding the node's RSA private key.
    pub key_path: Option<PathBuf>,
    /// PEM file holding the self-signed certificate whose Subject CN
    /// is the node's identity digest.
    pub cert_path: Option<PathBuf>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig { key_path: None, cert_path: None }
    }
}

/// Listening port, bootstrap trackers, and static peer addresses.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port to bind. `0` lets the OS choose an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// When `true`, the HTTP user interface is not started.
    pub nointerface: bool,
    /// Tracker base URLs queried at bootstrap (`spec.md` §6 "Tracker
    /// protocol").
    pub trackers: Vec<Url>,
    /// Static `host:port` peer addresses dialed at bootstrap in
    /// addition to any tracker-discovered ones.
    pub peers: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            port: default_port(),
            nointerface: false,
            trackers: Vec::new(),
            peers: Vec::new(),
        }
    }
}

/// On-disk locations for the block store's cache and any persisted
/// routing/subscription state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory backing `teapotnet_store::Store`'s content-addressed
    /// cache.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Directory for longer-lived state (identity keys, if not
    /// otherwise specified).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            cache_dir: default_cache_dir(),
            data_dir: default_data_dir(),
        }
    }
}

/// Deadlines and backoff parameters named throughout `spec.md` §4-§5.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Deadline for a secure-channel handshake to complete.
    #[serde(with = "humantime_serde", default = "default_handshake_timeout")]
    pub handshake: Duration,
    /// Idle window after which a retrieval's slowest source is
    /// dropped (`spec.md` §4.6 step 4).
    #[serde(with = "humantime_serde", default = "default_stall_timeout")]
    pub stall: Duration,
    /// Starting backoff applied to a link after a protocol violation.
    #[serde(with = "humantime_serde", default = "default_link_backoff_initial")]
    pub link_backoff_initial: Duration,
    /// Ceiling for the doubling link backoff (`spec.md` §4.6 "Failure
    /// semantics").
    #[serde(with = "humantime_serde", default = "default_link_backoff_max")]
    pub link_backoff_max: Duration,
    /// How long an announced digest set is cached before a repeated
    /// Subscribe re-asks the publisher (`spec.md` §4.5).
    #[serde(with = "humantime_serde", default = "default_publisher_cache_ttl")]
    pub publisher_cache_ttl: Duration,
    /// Window within which repeated Subscribe broadcasts for the same
    /// prefix from the same peer are collapsed.
    #[serde(with = "humantime_serde", default = "default_subscribe_collapse_window")]
    pub subscribe_collapse_window: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            handshake: default_handshake_timeout(),
            stall: default_stall_timeout(),
            link_backoff_initial: default_link_backoff_initial(),
            link_backoff_max: default_link_backoff_max(),
            publisher_cache_ttl: default_publisher_cache_ttl(),
            subscribe_collapse_window: default_subscribe_collapse_window(),
        }
    }
}

/// The complete, validated configuration for one Teapotnet node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Node identity material.
    pub identity: IdentityConfig,
    /// Network bootstrap and listening configuration.
    pub network: NetworkConfig,
    /// On-disk storage locations.
    pub storage: StorageConfig,
    /// Deadlines and backoff parameters.
    pub timeouts: TimeoutsConfig,
}

/// Loads a [`CoreConfig`] from a TOML file at `path`.
///
/// There is no implicit search path: the caller (the `teapotnet`
/// binary's `--config` flag) decides where to look, falling back to
/// [`CoreConfig::default`] when no path is given at all.
pub fn load(path: &Path) -> Result<CoreConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: CoreConfig = toml::from_str(&text)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_timeouts() {
        let config = CoreConfig::default();
        assert_eq!(config.timeouts.stall, Duration::from_secs(30));
        assert_eq!(config.timeouts.link_backoff_max, Duration::from_secs(600));
        assert_eq!(config.network.port, 0);
        assert!(!config.network.nointerface);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml = r#"
            [network]
            port = 9001
            trackers = ["https://tracker.example.invalid/"]

            [timeouts]
            stall = "1m"
        "#;
        let config: CoreConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.network.port, 9001);
        assert_eq!(config.network.trackers.len(), 1);
        assert_eq!(config.timeouts.stall, Duration::from_secs(60));
        // Untouched sections keep their defaults.
        assert_eq!(config.timeouts.handshake, Duration::from_secs(30));
        assert!(config.identity.key_path.is_none());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teapotnet.toml");
        std::fs::write(&path, "[network]\nport = 4242\n").unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.network.port, 4242);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
