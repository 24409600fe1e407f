//! Settings file and remembered state.
//!
//! Settings come from a YAML file (default `<config dir>/mccli/config.yaml`);
//! every field is optional and a missing file means defaults. The endpoint of
//! the last successful connection is remembered in `default_address` next to
//! the settings file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SettingsError;
use crate::pipeline::PipelineOptions;
use crate::session::{Endpoint, DEFAULT_BAUD_RATE, DEFAULT_TCP_PORT};

const CONFIG_DIR: &str = "mccli";
const CONFIG_FILE: &str = "config.yaml";
const ADDRESS_FILE: &str = "default_address";
const HISTORY_FILE: &str = "history";

/// How to reach the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSettings {
    /// TCP bridge host.
    pub host: Option<String>,
    pub port: u16,
    /// Serial device path.
    pub serial: Option<String>,
    pub baud: u32,
    /// Bluetooth address or name filter.
    pub address: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            host: None,
            port: DEFAULT_TCP_PORT,
            serial: None,
            baud: DEFAULT_BAUD_RATE,
            address: None,
        }
    }
}

impl ConnectionSettings {
    /// The configured endpoint; serial wins over TCP, TCP over BLE.
    pub fn endpoint(&self) -> Option<Endpoint> {
        if let Some(path) = &self.serial {
            return Some(Endpoint::Serial {
                path: path.clone(),
                baud: self.baud,
            });
        }
        if let Some(host) = &self.host {
            return Some(Endpoint::Tcp {
                host: host.clone(),
                port: self.port,
            });
        }
        self.address.as_ref().map(|target| Endpoint::Ble {
            target: target.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    /// Render every record as JSON.
    pub json: bool,
}

/// Wait windows in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSettings {
    /// Reply window of one request.
    pub request_ms: u64,
    pub login_ms: u64,
    pub status_ms: u64,
    /// Ack window when the device suggests none.
    pub ack_fallback_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        TimeoutSettings {
            request_ms: 5000,
            login_ms: 5000,
            status_ms: 5000,
            ack_fallback_ms: 6000,
        }
    }
}

/// Everything read from the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub output: OutputSettings,
    pub timeouts: TimeoutSettings,
    /// Channel indexes probed by `channels`.
    pub max_channels: u8,
    /// Nesting limit of `script`.
    pub script_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            connection: ConnectionSettings::default(),
            output: OutputSettings::default(),
            timeouts: TimeoutSettings::default(),
            max_channels: 8,
            script_depth: 8,
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Settings, SettingsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Self::parse(&text).map_err(|source| SettingsError::Yaml {
            path: path.display().to_string(),
            source,
        })
    }

    /// Parse settings from YAML text. An empty document yields the defaults.
    pub fn parse(text: &str) -> Result<Settings, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(text)
    }

    /// `<config dir>/mccli/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Reply window of one device request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_ms)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            login_timeout: Duration::from_millis(self.timeouts.login_ms),
            status_timeout: Duration::from_millis(self.timeouts.status_ms),
            ack_fallback: Duration::from_millis(self.timeouts.ack_fallback_ms),
            max_channels: self.max_channels,
            script_depth: self.script_depth,
            ..PipelineOptions::default()
        }
    }
}

/// Files kept alongside the settings file.
#[derive(Debug, Clone)]
pub struct StateDir {
    dir: PathBuf,
}

impl StateDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        StateDir { dir: dir.into() }
    }

    /// The directory holding `settings_path`, or the default config dir.
    pub fn for_settings(settings_path: Option<&Path>) -> Option<Self> {
        match settings_path.and_then(Path::parent) {
            Some(dir) => Some(StateDir::new(dir)),
            None => dirs::config_dir().map(|dir| StateDir::new(dir.join(CONFIG_DIR))),
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// The endpoint of the last successful connection.
    pub fn last_endpoint(&self) -> Option<Endpoint> {
        let path = self.dir.join(ADDRESS_FILE);
        let text = std::fs::read_to_string(&path).ok()?;
        match text.trim().parse() {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                debug!(path = %path.display(), "ignoring remembered endpoint: {}", e);
                None
            }
        }
    }

    /// Remember `endpoint` for the next run.
    pub fn remember_endpoint(&self, endpoint: &Endpoint) -> Result<(), SettingsError> {
        let path = self.dir.join(ADDRESS_FILE);
        let io_error = |source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_error)?;
        std::fs::write(&path, format!("{}\n", endpoint)).map_err(io_error)
    }
}
