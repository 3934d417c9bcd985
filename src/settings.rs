//! Flasher settings with persistence.
//!
//! This module provides:
//! - `FlasherSettings` struct holding every tunable the core uses
//! - Persistence to a JSON file in the app data directory
//!
//! ## Extensibility
//!
//! To add a new setting:
//! 1. Add the field to `FlasherSettings` with a `#[serde(default = ...)]`
//! 2. Add its default to `impl Default for FlasherSettings`
//! 3. Update the TypeScript `FlasherSettings` interface to match

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FlasherError, FlasherResult};

/// Repository whose latest release carries the downloadable firmware images.
pub const DEFAULT_RELEASE_REPOSITORY: &str = "upsidedownlabs/NPG-Lite-Firmware";

/// Application partition offset on the NPG Lite (ESP32-C6) flash.
pub const DEFAULT_FLASH_OFFSET: u32 = 0x10000;

/// User-tunable flasher settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlasherSettings {
    /// `owner/name` of the repository used when no repository is given.
    #[serde(default = "default_release_repository")]
    pub release_repository: String,

    /// Interval between background port scans.
    #[serde(default = "default_port_poll_interval_ms")]
    pub port_poll_interval_ms: u64,

    /// Upper bound for a single port scan.
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,

    /// Upper bound for downloading one release asset.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Flash address the application image is written to.
    #[serde(default = "default_flash_offset")]
    pub flash_offset: u32,

    #[serde(default = "default_flash_baud_rate")]
    pub flash_baud_rate: u32,

    /// Program invoked to write the image (espflash compatible CLI).
    #[serde(default = "default_flasher_program")]
    pub flasher_program: String,

    /// Only report USB serial ports.
    #[serde(default = "default_usb_ports_only")]
    pub usb_ports_only: bool,
}

fn default_release_repository() -> String {
    DEFAULT_RELEASE_REPOSITORY.to_string()
}

fn default_port_poll_interval_ms() -> u64 {
    3000
}

fn default_discovery_timeout_ms() -> u64 {
    2000
}

fn default_download_timeout_secs() -> u64 {
    60
}

fn default_flash_offset() -> u32 {
    DEFAULT_FLASH_OFFSET
}

fn default_flash_baud_rate() -> u32 {
    921_600
}

fn default_flasher_program() -> String {
    "espflash".to_string()
}

fn default_usb_ports_only() -> bool {
    true
}

impl Default for FlasherSettings {
    fn default() -> Self {
        Self {
            release_repository: default_release_repository(),
            port_poll_interval_ms: default_port_poll_interval_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            download_timeout_secs: default_download_timeout_secs(),
            flash_offset: default_flash_offset(),
            flash_baud_rate: default_flash_baud_rate(),
            flasher_program: default_flasher_program(),
            usb_ports_only: default_usb_ports_only(),
        }
    }
}

impl FlasherSettings {
    pub fn port_poll_interval(&self) -> Duration {
        Duration::from_millis(self.port_poll_interval_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Check if these settings differ from defaults.
    /// Useful for logging to show when non-default settings are applied.
    pub fn has_non_default_settings(&self) -> bool {
        *self != Self::default()
    }
}

/// Settings file name stored in app data directory.
const SETTINGS_FILENAME: &str = "flasher_settings.json";

/// Manages persistence of flasher settings to a JSON file.
pub struct SettingsManager {
    settings_file_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager for the given app data directory.
    pub fn new(app_data_dir: &Path) -> Self {
        let settings_file_path = app_data_dir.join(SETTINGS_FILENAME);
        Self { settings_file_path }
    }

    /// Load settings from disk, returning defaults if file doesn't exist.
    pub fn load(&self) -> FlasherResult<FlasherSettings> {
        if !self.settings_file_path.exists() {
            return Ok(FlasherSettings::default());
        }

        let contents = fs::read_to_string(&self.settings_file_path)
            .map_err(|e| FlasherError::Settings(format!("Failed to read settings file: {}", e)))?;

        // Handle empty file gracefully
        if contents.trim().is_empty() {
            return Ok(FlasherSettings::default());
        }

        serde_json::from_str(&contents)
            .map_err(|e| FlasherError::Settings(format!("Failed to parse settings JSON: {}", e)))
    }

    /// Save settings to disk.
    pub fn save(&self, settings: &FlasherSettings) -> FlasherResult<()> {
        if let Some(parent) = self.settings_file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FlasherError::Settings(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(settings)
            .map_err(|e| FlasherError::Settings(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&self.settings_file_path, contents)
            .map_err(|e| FlasherError::Settings(format!("Failed to write settings file: {}", e)))?;

        if settings.has_non_default_settings() {
            log::info!("Saved non-default settings: {:?}", settings);
        }

        Ok(())
    }

    /// Get the path where settings are stored.
    pub fn settings_path(&self) -> &Path {
        &self.settings_file_path
    }
}
