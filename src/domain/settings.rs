use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "lego_pf_remote".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Period of the dispatch loop. Each tick sends up to two 2-byte frames.
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
    /// Time given to the BLE stack to settle before a connect request.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: default_dispatch_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_dispatch_interval_ms() -> u64 {
    200
}
fn default_settle_delay_ms() -> u64 {
    500
}

impl Settings {
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(contents: &str) -> anyhow::Result<Self> {
        let settings: Settings = serde_json::from_str(contents)?;
        if settings.dispatch_interval_ms == 0 {
            anyhow::bail!("dispatch_interval_ms must be greater than zero");
        }
        Ok(settings)
    }
}

/// Read-only access to the settings file. Nothing is ever written back.
pub struct SettingsService {
    settings: Settings,
    source: Option<PathBuf>,
}

impl SettingsService {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults, a malformed one is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };

        let Some(path) = path.filter(|p| p.exists()) else {
            return Ok(Self {
                settings: Settings::default(),
                source: None,
            });
        };

        let settings = Self::load_from_file(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        Ok(Self {
            settings,
            source: Some(path),
        })
    }

    fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("LegoPfRemote");
        path.push("settings.json");
        Some(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        Settings::from_json(&contents)
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// File the settings came from, `None` when running on defaults.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}
