//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Default countdown length and recompute period
//! - Alert preferences and text
//! - Named countdown presets (proofing, chilling, baking, ...)
//!
//! Configuration is stored at `<data dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::alerts::Alert;
use crate::error::ConfigError;

/// Countdown-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownConfig {
    /// Used when a countdown is started without a duration or preset.
    #[serde(default = "default_seconds")]
    pub default_seconds: u64,
    /// How often a running countdown is recomputed. Sub-second.
    #[serde(default = "default_recompute_interval_ms")]
    pub recompute_interval_ms: u64,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_body")]
    pub body: String,
    /// Ring the terminal bell when a watched countdown completes.
    #[serde(default = "default_true")]
    pub bell: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub countdown: CountdownConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Named countdown lengths in seconds.
    #[serde(default = "default_presets")]
    pub presets: BTreeMap<String, u64>,
}

// Default functions
fn default_seconds() -> u64 {
    10 * 60
}
fn default_recompute_interval_ms() -> u64 {
    250
}
fn default_true() -> bool {
    true
}
fn default_title() -> String {
    "Timer finished".into()
}
fn default_body() -> String {
    "Your bake timer is done.".into()
}
fn default_presets() -> BTreeMap<String, u64> {
    [
        ("proof", 60 * 60),
        ("chill", 30 * 60),
        ("bake", 25 * 60),
        ("cool", 15 * 60),
        ("rest", 10 * 60),
    ]
    .into_iter()
    .map(|(name, secs)| (name.to_string(), secs))
    .collect()
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            default_seconds: default_seconds(),
            recompute_interval_ms: default_recompute_interval_ms(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: default_title(),
            body: default_body(),
            bell: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            countdown: CountdownConfig::default(),
            notifications: NotificationsConfig::default(),
            presets: default_presets(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => value
                    .parse::<bool>()
                    .map(serde_json::Value::Bool)
                    .map_err(|e| invalid(e.to_string()))?,
                serde_json::Value::Number(_) => value
                    .parse::<u64>()
                    .map(|n| serde_json::Value::Number(n.into()))
                    .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// `<data dir>/config.toml`.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the data directory, writing the defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or is
    /// invalid, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing the defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Reject values the countdown cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..1000).contains(&self.countdown.recompute_interval_ms) {
            return Err(ConfigError::InvalidValue {
                key: "countdown.recompute_interval_ms".into(),
                message: format!(
                    "must be between 1 and 999, got {}",
                    self.countdown.recompute_interval_ms
                ),
            });
        }
        if self.countdown.default_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "countdown.default_seconds".into(),
                message: "must be positive".into(),
            });
        }
        if let Some((name, _)) = self.presets.iter().find(|(_, secs)| **secs == 0) {
            return Err(ConfigError::InvalidValue {
                key: format!("presets.{name}"),
                message: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. `presets.<name>` may name a
    /// new preset. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the result does not validate. The config is unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut updated = self.clone();
        match key.strip_prefix("presets.") {
            Some(name) if !name.is_empty() && !name.contains('.') => {
                let secs = value.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("cannot parse '{value}' as seconds"),
                })?;
                updated.presets.insert(name.to_string(), secs);
            }
            _ => {
                let mut json = serde_json::to_value(&updated).map_err(|e| {
                    ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: e.to_string(),
                    }
                })?;
                Self::set_json_value_by_path(&mut json, key, value)?;
                updated = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })?;
            }
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Seconds for a named preset.
    pub fn preset_seconds(&self, name: &str) -> Result<u64, ConfigError> {
        self.presets
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))
    }

    pub fn recompute_interval(&self) -> Duration {
        Duration::from_millis(self.countdown.recompute_interval_ms)
    }

    pub fn alert(&self) -> Alert {
        Alert {
            title: self.notifications.title.clone(),
            body: self.notifications.body.clone(),
        }
    }
}
