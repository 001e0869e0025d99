//! Configuration file support for notetaker.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (NOTETAKER_*)
//! 3. Local config file (./notetaker.toml)
//! 4. Global config file (~/.config/notetaker/config.toml)
//!
//! An explicit `--config` file must exist and parse; implicit files only warn.

use {
    crate::CliError,
    directories::ProjectDirs,
    log::{debug, warn},
    notetaker::SessionConfig,
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = "notetaker.toml";

/// Device node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// hidraw node of the command interface (e.g., "/dev/hidraw0").
    pub primary: Option<PathBuf>,
    /// hidraw node of the event interface (e.g., "/dev/hidraw1").
    pub secondary: Option<PathBuf>,
}

/// Transfer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Give up on the ready handshake after this many seconds.
    pub ready_deadline_secs: Option<u64>,
    /// Recover from a packet stream that stops early.
    #[serde(default)]
    pub recover_truncated_stream: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device node configuration.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Transfer configuration.
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Config {
    /// Load configuration from the global and local config files.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_lenient(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_lenient(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!(
                "Cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        let config = Self::parse(&content).map_err(|e| {
            CliError::Config(format!(
                "Invalid config file {}: {e}",
                path.display()
            ))
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load an implicit config file, warning instead of failing.
    fn load_lenient(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "notetaker").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        // Device nodes
        if other.device.primary.is_some() {
            self.device.primary = other.device.primary;
        }
        if other.device.secondary.is_some() {
            self.device.secondary = other.device.secondary;
        }

        // Transfer
        if other.transfer.read_timeout_ms.is_some() {
            self.transfer.read_timeout_ms = other.transfer.read_timeout_ms;
        }
        if other.transfer.ready_deadline_secs.is_some() {
            self.transfer.ready_deadline_secs = other.transfer.ready_deadline_secs;
        }
        if other.transfer.recover_truncated_stream {
            self.transfer.recover_truncated_stream = true;
        }
    }

    /// Build the session configuration, `timeout_ms` taking precedence over the file.
    pub fn session_config(&self, timeout_ms: Option<u64>) -> Result<SessionConfig, CliError> {
        let mut session = SessionConfig::default()
            .with_truncated_stream_recovery(self.transfer.recover_truncated_stream);

        let ms = match (timeout_ms, self.transfer.read_timeout_ms) {
            (Some(0), _) => {
                return Err(CliError::Usage(
                    "--timeout-ms must be greater than zero".to_string(),
                ));
            },
            (Some(ms), _) => Some(ms),
            (None, Some(0)) => {
                return Err(CliError::Config(
                    "transfer.read_timeout_ms must be greater than zero".to_string(),
                ));
            },
            (None, ms) => ms,
        };
        if let Some(ms) = ms {
            session = session.with_read_timeout(Duration::from_millis(ms));
        }

        if let Some(secs) = self.transfer.ready_deadline_secs {
            session = session.with_ready_deadline(Some(Duration::from_secs(secs)));
        }

        Ok(session)
    }
}
