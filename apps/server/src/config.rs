//! Server configuration management.
//!
//! Configuration is stored as TOML. The path is the first command-line
//! argument, or `~/.config/pulselink/server.toml` when none is given. A
//! missing file is created with defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pulselink_protocol::Framing;
use pulselink_protocol::constants::{DEFAULT_PORT, DEFAULT_READ_IDLE, MAX_FRAME_LEN};
use pulselink_server::ServerConfig;
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds of inbound silence before a pong is sent (0 disables).
    #[serde(default = "default_read_idle_secs")]
    pub read_idle_secs: u64,

    #[serde(default)]
    pub framing: Framing,

    /// Largest accepted frame body in bytes.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_read_idle_secs() -> u64 {
    DEFAULT_READ_IDLE.as_secs()
}

fn default_max_frame_len() -> usize {
    MAX_FRAME_LEN
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_idle_secs: default_read_idle_secs(),
            framing: Framing::default(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path,
            None => config_path(),
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            read_idle: Duration::from_secs(self.read_idle_secs),
            framing: self.framing,
            max_frame_len: self.max_frame_len,
            ..ServerConfig::default()
        }
    }
}

/// Returns the default configuration file path.
fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("pulselink")
        .join("server.toml")
}
