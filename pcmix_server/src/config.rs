//! Server configuration.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! TOML file, environment variables, and command-line flags.

use serde::Deserialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

pub use pcmix_network::DEFAULT_SOCKET_PATH;
pub const DEFAULT_LOCK_PATH: &str = "/Session/mixer.lock";
pub const DEFAULT_DEVICE_PATH: &str = "/Devices/sound";
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("tick interval must be at least 1 ms")]
    ZeroTick,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Where clients connect.
    pub socket_path: PathBuf,
    /// Single-instance lock marker.
    pub lock_path: PathBuf,
    /// Where mixed periods are written.
    pub device_path: PathBuf,
    pub tick_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET_PATH.into(),
            lock_path: DEFAULT_LOCK_PATH.into(),
            device_path: DEFAULT_DEVICE_PATH.into(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }

        Ok(())
    }

    #[inline(always)]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Command line of `pcmixd`.
#[derive(Debug, Default, clap::Parser)]
#[command(name = "pcmixd", version, about = "Audio mixing server")]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Socket clients connect to
    #[arg(long, value_name = "PATH", env = "PCMIX_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Single-instance lock marker
    #[arg(long, value_name = "PATH", env = "PCMIX_LOCK")]
    pub lock: Option<PathBuf>,

    /// Sound device mixed audio is written to
    #[arg(long, value_name = "PATH", env = "PCMIX_DEVICE")]
    pub device: Option<PathBuf>,

    /// Mixing period, in milliseconds
    #[arg(long, value_name = "MS")]
    pub tick_ms: Option<u64>,
}

impl Cli {
    /// Layers the command line over the configuration file (or the defaults).
    pub fn resolve(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(p) = &self.socket {
            config.socket_path.clone_from(p);
        }
        if let Some(p) = &self.lock {
            config.lock_path.clone_from(p);
        }
        if let Some(p) = &self.device {
            config.device_path.clone_from(p);
        }
        if let Some(ms) = self.tick_ms {
            config.tick_interval_ms = ms;
        }

        config.validate()?;

        Ok(config)
    }
}
