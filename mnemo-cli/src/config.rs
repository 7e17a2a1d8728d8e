//! Configuration file support for mnemo.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (MNEMO_PORT, MNEMO_BAUD)
//! 3. Local config file (./mnemo.toml)
//! 4. Global config file (~/.config/mnemo/config.toml)
//!
//! ```toml
//! [connection]
//! port = "/dev/ttyACM0"
//! baud = 460800
//!
//! [import]
//! format = "dmp"
//! protocol = "v1"
//!
//! [usb]
//! vid = 0x04D8
//! pid = 0x00DD
//! ```

use {
    directories::ProjectDirs,
    log::{debug, warn},
    mnemo::{MNEMO_PID, MNEMO_VID},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Name of the per-directory config file.
pub const LOCAL_CONFIG: &str = "mnemo.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub port: Option<String>,
    /// Baud rate for firmware updates.
    pub baud: Option<u32>,
}

/// Survey import defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Dump format, `dmp` or `raw`.
    pub format: Option<String>,
    /// Download protocol, `v1` or `v2`.
    pub protocol: Option<String>,
}

/// USB identity used for autodetection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsbConfig {
    /// USB Vendor ID.
    pub vid: Option<u16>,
    /// USB Product ID.
    pub pid: Option<u16>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Import settings.
    #[serde(default)]
    pub import: ImportConfig,
    /// Autodetection settings.
    #[serde(default)]
    pub usb: UsbConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse TOML config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mnemo").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// USB VID/PID to autodetect, falling back to the logger's own.
    pub fn usb_identity(&self) -> (u16, u16) {
        (
            self.usb.vid.unwrap_or(MNEMO_VID),
            self.usb.pid.unwrap_or(MNEMO_PID),
        )
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.port.is_some() {
            self.connection.port = other.connection.port;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }

        if other.import.format.is_some() {
            self.import.format = other.import.format;
        }
        if other.import.protocol.is_some() {
            self.import.protocol = other.import.protocol;
        }

        if other.usb.vid.is_some() {
            self.usb.vid = other.usb.vid;
        }
        if other.usb.pid.is_some() {
            self.usb.pid = other.usb.pid;
        }
    }
}
