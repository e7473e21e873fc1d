//! Application configuration
//!
//! A single TOML file. Every section and field is optional and falls back to
//! its default, so an empty file is a valid configuration.
//!
//! ```toml
//! [link]
//! transport = "udp"
//! host = "192.168.45.246"
//! port = 5005
//!
//! [controller]
//! joystick_deadzone = 0.05
//! gamepad = "first"
//!
//! [drive]
//! stick = "right"
//! threshold = 0.5
//! wire_format = "letter"
//!
//! [logging]
//! level = "info"
//! ```

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;

use crate::controller::ControllerSettings;
use crate::drive::DriveSettings;
use crate::link::{LinkSettings, TransportKind};

const CONFIG_DIR: &str = "carcontroller";
const CONFIG_FILE: &str = "config.toml";
const CONFIG_ENV: &str = "CARCONTROLLER_CONFIG";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkSettings,
    pub controller: ControllerSettings,
    pub drive: DriveSettings,
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> Result<Level> {
        Level::from_str(&self.level).map_err(|_| eyre!("Unknown log level: {}", self.level))
    }
}

impl AppConfig {
    /// `$CARCONTROLLER_CONFIG`, else the platform config directory
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir().ok_or_else(|| eyre!("No config directory available"))?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    /// Writes the default configuration if nothing exists at `path` yet
    ///
    /// Returns true if a file was written. Runs before logging is set up, so
    /// reporting is left to the caller.
    pub async fn ensure_default(path: &Path) -> Result<bool> {
        if tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check config file {}: {}", path.display(), e))?
        {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(&AppConfig::default())
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;

        Ok(true)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.link.transport {
            TransportKind::Udp => {
                if self.link.host.trim().is_empty() {
                    return Err(eyre!("link.host must not be empty"));
                }
                if self.link.port == 0 {
                    return Err(eyre!("link.port must not be 0"));
                }
            }
            TransportKind::Serial => {
                if self.link.serial.path.trim().is_empty() {
                    return Err(eyre!("link.serial.path must not be empty"));
                }
                if self.link.serial.baud_rate == 0 {
                    return Err(eyre!("link.serial.baud_rate must not be 0"));
                }
            }
        }

        let threshold = self.drive.threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(eyre!("drive.threshold must be in (0, 1), got {}", threshold));
        }
        if self.drive.frame_interval_ms == 0 {
            return Err(eyre!("drive.frame_interval_ms must not be 0"));
        }

        let deadzone = self.controller.joystick_deadzone;
        if !(0.0..1.0).contains(&deadzone) {
            return Err(eyre!(
                "controller.joystick_deadzone must be in [0, 1), got {}",
                deadzone
            ));
        }
        if self.controller.collection_interval_ms == 0 {
            return Err(eyre!("controller.collection_interval_ms must not be 0"));
        }

        self.logging.level()?;
        Ok(())
    }

    /// Valid but questionable settings, one message each
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let deadzone = self.controller.joystick_deadzone;
        let threshold = self.drive.threshold;
        if deadzone >= threshold {
            warnings.push(format!(
                "Deadzone {} swallows the drive threshold {}, only full deflection will steer",
                deadzone, threshold
            ));
        }
        warnings
    }
}
