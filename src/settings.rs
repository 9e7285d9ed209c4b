//! Persisted emulator settings.
//!
//! A small record that outlives any single session: loaded when the controller
//! is created, written whenever the user changes it. Stored as TOML under the
//! fixed key `emulator-settings`:
//!
//! ```toml
//! swap_control_and_command = true
//! ```

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::app_dir;

/// Storage key for the settings record
pub const SETTINGS_KEY: &str = "emulator-settings";

/// User-adjustable emulator settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorSettings {
    /// Swap the Control and Command keys so browser shortcuts reach the Mac
    pub swap_control_and_command: bool,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write settings: {0}")]
    Write(#[from] std::io::Error),
}

/// Where settings are kept between sessions
pub trait SettingsStore {
    /// Stored settings, or the defaults if nothing usable is stored
    fn load(&self) -> EmulatorSettings;

    fn save(&mut self, settings: &EmulatorSettings) -> Result<(), SettingsError>;
}

/// Settings stored as a TOML file in a directory
pub struct FileSettingsStore {
    dir: PathBuf,
}

impl FileSettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store in the application directory (`~/.emusession`)
    pub fn in_app_dir() -> Option<Self> {
        app_dir().map(Self::new)
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.toml", SETTINGS_KEY))
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> EmulatorSettings {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return EmulatorSettings::default(),
        };
        match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                EmulatorSettings::default()
            }
        }
    }

    fn save(&mut self, settings: &EmulatorSettings) -> Result<(), SettingsError> {
        fs::create_dir_all(&self.dir)?;
        let content = toml::to_string_pretty(settings)?;
        fs::write(self.path(), content)?;
        debug!("Saved settings to {}", self.path().display());
        Ok(())
    }
}

/// Settings kept in memory only
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    stored: Option<EmulatorSettings>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with(settings: EmulatorSettings) -> Self {
        Self { stored: Some(settings) }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> EmulatorSettings {
        self.stored.clone().unwrap_or_default()
    }

    fn save(&mut self, settings: &EmulatorSettings) -> Result<(), SettingsError> {
        self.stored = Some(settings.clone());
        Ok(())
    }
}
