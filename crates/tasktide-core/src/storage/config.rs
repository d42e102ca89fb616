//! TOML-based application configuration.
//!
//! Stores:
//! - Countdown length per timer mode
//! - Restore behaviour for paused and stale snapshots
//! - Sound cue files and volume
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::timer::{ModeDurations, RestorePolicy};

/// Timer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_focus_secs")]
    pub focus_secs: u64,
    #[serde(default = "default_short_break_secs")]
    pub short_break_secs: u64,
    #[serde(default = "default_long_break_secs")]
    pub long_break_secs: u64,
    /// Charge wall-clock time against a paused countdown when restoring.
    #[serde(default)]
    pub paused_time_decays: bool,
    /// Snapshots older than this are discarded on startup.
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u64,
}

/// Sound cue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 0..=100
    #[serde(default = "default_volume")]
    pub volume: u8,
    /// Played when a countdown starts. Relative to the data directory.
    #[serde(default = "default_start_sound")]
    pub start: String,
    /// Played when a countdown reaches zero. Relative to the data directory.
    #[serde(default = "default_alarm_sound")]
    pub alarm: String,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub sounds: SoundsConfig,
}

fn default_focus_secs() -> u64 {
    ModeDurations::DEFAULT_FOCUS_SECS
}
fn default_short_break_secs() -> u64 {
    ModeDurations::DEFAULT_SHORT_BREAK_SECS
}
fn default_long_break_secs() -> u64 {
    ModeDurations::DEFAULT_LONG_BREAK_SECS
}
fn default_stale_after_hours() -> u64 {
    24
}
fn default_true() -> bool {
    true
}
fn default_volume() -> u8 {
    50
}
fn default_start_sound() -> String {
    "sounds/start.mp3".into()
}
fn default_alarm_sound() -> String {
    "sounds/alarm.mp3".into()
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            focus_secs: default_focus_secs(),
            short_break_secs: default_short_break_secs(),
            long_break_secs: default_long_break_secs(),
            paused_time_decays: false,
            stale_after_hours: default_stale_after_hours(),
        }
    }
}

impl Default for SoundsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: default_volume(),
            start: default_start_sound(),
            alarm: default_alarm_sound(),
        }
    }
}

impl TimerConfig {
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if any duration is zero.
    pub fn durations(&self) -> Result<ModeDurations, ConfigError> {
        ModeDurations::new(self.focus_secs, self.short_break_secs, self.long_break_secs)
    }

    pub fn restore_policy(&self) -> RestorePolicy {
        if self.paused_time_decays {
            RestorePolicy::Decay
        } else {
            RestorePolicy::Preserve
        }
    }

    pub fn stale_after_ms(&self) -> i64 {
        let ms = self.stale_after_hours.saturating_mul(60 * 60 * 1000);
        i64::try_from(ms).unwrap_or(i64::MAX)
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
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from disk, writing defaults when no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Load from disk, returning defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }

    /// # Errors
    /// Returns `ConfigError::ParseFailed` on malformed TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.clone(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| save_failed(e.to_string()))?;
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

    /// Set a value by key in memory, validating the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting durations are invalid.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.timer.durations()?;
        *self = updated;
        Ok(())
    }

    /// Set a value by key and save.
    ///
    /// # Errors
    ///
    /// Same as [`Config::apply`], plus failures writing the file.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed = Config::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.timer.focus_secs, 1500);
        assert_eq!(parsed.sounds.volume, 50);
        assert!(!parsed.timer.paused_time_decays);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg = Config::from_toml("[timer]\nfocus_secs = 3000\n").unwrap();
        assert_eq!(cfg.timer.focus_secs, 3000);
        assert_eq!(cfg.timer.short_break_secs, 300);
        assert!(cfg.sounds.enabled);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            Config::from_toml("[timer\nfocus_secs ="),
            Err(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timer.focus_secs").as_deref(), Some("1500"));
        assert_eq!(cfg.get("sounds.enabled").as_deref(), Some("true"));
        assert_eq!(cfg.get("sounds.alarm").as_deref(), Some("sounds/alarm.mp3"));
        assert!(cfg.get("timer.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.apply("timer.short_break_secs", "420").unwrap();
        cfg.apply("timer.paused_time_decays", "true").unwrap();
        cfg.apply("sounds.start", "/tmp/ding.wav").unwrap();
        assert_eq!(cfg.timer.short_break_secs, 420);
        assert_eq!(cfg.timer.restore_policy(), RestorePolicy::Decay);
        assert_eq!(cfg.sounds.start, "/tmp/ding.wav");
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("timer.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.apply("", "1"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn apply_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.apply("sounds.enabled", "not_a_bool").is_err());
        assert!(cfg.apply("timer.focus_secs", "soon").is_err());
        assert!(cfg.apply("sounds.volume", "300").is_err());
        assert_eq!(cfg.sounds.volume, 50);
    }

    #[test]
    fn apply_rejects_zero_duration() {
        let mut cfg = Config::default();
        assert!(cfg.apply("timer.long_break_secs", "0").is_err());
        assert_eq!(cfg.timer.long_break_secs, 900);
    }

    #[test]
    fn stale_window_in_ms() {
        assert_eq!(TimerConfig::default().stale_after_ms(), 86_400_000);
    }
}
