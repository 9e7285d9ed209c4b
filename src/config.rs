//! Host configuration for emusession.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.emusession/config.toml`
//! - The application directory used for logs and persisted settings
//!
//! # Configuration File
//!
//! ```toml
//! # Page the session is resolved from when no --url is given
//! default_url = "https://system7.app/"
//!
//! # trace, debug, info, warn, error
//! log_level = "info"
//!
//! [viewport]
//! width = 1440
//! height = 900
//!
//! [display]
//! available_width = 1920
//! available_height = 1080
//!
//! [platform]
//! shared_memory = true
//!
//! [backend]
//! chunk_delay_ms = 5
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{warn, Level};

use crate::catalog::DEFAULT_DOMAIN;
use crate::display::ScreenSize;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config: {0}")]
    Write(#[from] std::io::Error),
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL resolved when none is given on the command line
    pub default_url: String,
    /// Log level name
    pub log_level: String,
    /// Browser viewport the screen is sized for
    pub viewport: ViewportConfig,
    /// Physical display used for fullscreen
    pub display: DisplayConfig,
    /// Host platform capabilities
    pub platform: PlatformConfig,
    /// Scripted backend pacing
    pub backend: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_url: format!("https://{}/", DEFAULT_DOMAIN),
            log_level: "info".to_string(),
            viewport: ViewportConfig::default(),
            display: DisplayConfig::default(),
            platform: PlatformConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

/// Viewport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

/// Fullscreen display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub available_width: u32,
    pub available_height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            available_width: 1920,
            available_height: 1080,
        }
    }
}

/// Platform capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub shared_memory: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self { shared_memory: true }
    }
}

/// Scripted backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Delay between simulated chunk loads
    pub chunk_delay_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { chunk_delay_ms: 5 }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Self {
        Self::path().map(|path| Self::load_from(&path)).unwrap_or_default()
    }

    /// Load from `path`, falling back to defaults if it is missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the configuration to `path` unless a file is already there.
    ///
    /// Returns whether a file was written.
    pub fn save_if_missing(&self, path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(true)
    }

    /// Config file path
    pub fn path() -> Option<PathBuf> {
        app_dir().map(|dir| dir.join("config.toml"))
    }

    /// Tracing level for `log_level`, INFO if unrecognized
    pub fn level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }

    pub fn viewport_size(&self) -> ScreenSize {
        ScreenSize::new(self.viewport.width, self.viewport.height)
    }

    pub fn available_display_size(&self) -> ScreenSize {
        ScreenSize::new(self.display.available_width, self.display.available_height)
    }
}

/// Application directory, created on first use
pub fn app_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".emusession");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
