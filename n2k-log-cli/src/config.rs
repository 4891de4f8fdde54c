//! Configuration loading and parsing
//!
//! Every section is optional; anything left out falls back to the defaults
//! below, and command-line flags are applied on top in `main`.

use anyhow::{bail, Context, Result};
use n2k_log_decoder::DecoderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default RAW UDP port of the gateway
pub const DEFAULT_PORT: u16 = 1457;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListenerConfig {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Kernel receive buffer size in bytes (OS default when unset)
    #[serde(default)]
    pub recv_buffer_size: Option<usize>,
    /// Consecutive transient receive errors tolerated before giving up
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_read_timeout() -> u64 {
    250
}

fn default_max_consecutive_errors() -> u32 {
    16
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            read_timeout_ms: default_read_timeout(),
            recv_buffer_size: None,
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

impl ListenerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Session files are named `<base_path>NNN.csv`
    #[serde(default)]
    pub base_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Run stale-sequence eviction after this many datagrams
    #[serde(default = "default_housekeeping_every")]
    pub housekeeping_every: u64,
    /// ...or when this much time has passed since the last run
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_ms: u64,
    /// Status line period, 0 disables it
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    /// Warn when no datagram arrived for this long, 0 disables it
    #[serde(default = "default_idle_warning")]
    pub idle_warning_secs: u64,
}

fn default_housekeeping_every() -> u64 {
    64
}

fn default_housekeeping_interval() -> u64 {
    500
}

fn default_status_interval() -> u64 {
    60
}

fn default_idle_warning() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            housekeeping_every: default_housekeeping_every(),
            housekeeping_interval_ms: default_housekeeping_interval(),
            status_interval_secs: default_status_interval(),
            idle_warning_secs: default_idle_warning(),
        }
    }
}

impl PipelineConfig {
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }

    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }

    pub fn idle_warning(&self) -> Option<Duration> {
        (self.idle_warning_secs > 0).then(|| Duration::from_secs(self.idle_warning_secs))
    }
}

impl AppConfig {
    /// Check the merged configuration before anything is opened
    pub fn validate(&self) -> Result<()> {
        if self.listener.read_timeout_ms == 0 {
            bail!("listener.read_timeout_ms must be greater than zero");
        }
        if self.pipeline.housekeeping_every == 0 {
            bail!("pipeline.housekeeping_every must be greater than zero");
        }
        if self.output.base_path.is_none() {
            bail!("no output base path given (use --output or [output] base_path)");
        }
        self.decoder
            .validate()
            .context("Invalid [decoder] section")?;
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [listener]
            bind = "192.168.4.2"
            port = 2000
            recv_buffer_size = 1048576

            [output]
            base_path = "/var/log/n2k/boat_"

            [decoder]
            fast_packet_timeout_ms = 750
            pgn_filter = [129025, 129026, 127250]

            [pipeline]
            status_interval_secs = 0
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(
            config.listener.socket_addr(),
            "192.168.4.2:2000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.listener.recv_buffer_size, Some(1_048_576));
        assert_eq!(config.listener.read_timeout_ms, 250);
        assert_eq!(
            config.output.base_path,
            Some(PathBuf::from("/var/log/n2k/boat_"))
        );
        assert_eq!(config.decoder.fast_packet_timeout_ms, 750);
        assert!(config.decoder.should_process_pgn(127250));
        assert!(!config.decoder.should_process_pgn(128275));
        assert_eq!(config.pipeline.status_interval(), None);
        assert_eq!(config.pipeline.housekeeping_every, 64);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.listener.socket_addr().port(), DEFAULT_PORT);
        assert_eq!(config.listener.read_timeout(), Duration::from_millis(250));
        assert_eq!(config.listener.max_consecutive_errors, 16);
        assert_eq!(config.decoder.fast_packet_timeout_ms, 2000);
        assert_eq!(config.pipeline.idle_warning(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.output.base_path = Some(PathBuf::from("log_"));
        assert!(config.validate().is_ok());

        config.pipeline.housekeeping_every = 0;
        assert!(config.validate().is_err());
        config.pipeline.housekeeping_every = 1;

        config.decoder.fast_packet_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n2k.toml");
        fs::write(&path, "[listener]\nport = 10110\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.port, 10110);

        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
