use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Countdown flavour. Wire names match the stored snapshot format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimerMode {
    #[default]
    #[serde(rename = "pomodoro")]
    Focus,
    #[serde(rename = "shortBreak")]
    ShortBreak,
    #[serde(rename = "longBreak")]
    LongBreak,
}

impl TimerMode {
    pub const ALL: [TimerMode; 3] = [TimerMode::Focus, TimerMode::ShortBreak, TimerMode::LongBreak];

    pub fn label(&self) -> &'static str {
        match self {
            TimerMode::Focus => "Focus",
            TimerMode::ShortBreak => "Short Break",
            TimerMode::LongBreak => "Long Break",
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimerMode::Focus => "focus",
            TimerMode::ShortBreak => "short-break",
            TimerMode::LongBreak => "long-break",
        })
    }
}

impl FromStr for TimerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "focus" | "pomodoro" => Ok(TimerMode::Focus),
            "short-break" | "shortbreak" | "short_break" | "short" => Ok(TimerMode::ShortBreak),
            "long-break" | "longbreak" | "long_break" | "long" => Ok(TimerMode::LongBreak),
            other => Err(format!(
                "unknown timer mode '{other}' (expected focus, short-break or long-break)"
            )),
        }
    }
}

/// Configured countdown length per mode, in seconds.
///
/// Built once when the engine is constructed and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDurations {
    focus_secs: u64,
    short_break_secs: u64,
    long_break_secs: u64,
}

impl ModeDurations {
    pub const DEFAULT_FOCUS_SECS: u64 = 25 * 60;
    pub const DEFAULT_SHORT_BREAK_SECS: u64 = 5 * 60;
    pub const DEFAULT_LONG_BREAK_SECS: u64 = 15 * 60;

    /// Build a table, rejecting zero-length modes.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the first zero entry.
    pub fn new(
        focus_secs: u64,
        short_break_secs: u64,
        long_break_secs: u64,
    ) -> Result<Self, ConfigError> {
        for (key, value) in [
            ("timer.focus_secs", focus_secs),
            ("timer.short_break_secs", short_break_secs),
            ("timer.long_break_secs", long_break_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "duration must be greater than zero".to_string(),
                });
            }
        }
        Ok(Self {
            focus_secs,
            short_break_secs,
            long_break_secs,
        })
    }

    pub fn secs(&self, mode: TimerMode) -> u64 {
        match mode {
            TimerMode::Focus => self.focus_secs,
            TimerMode::ShortBreak => self.short_break_secs,
            TimerMode::LongBreak => self.long_break_secs,
        }
    }
}

impl Default for ModeDurations {
    fn default() -> Self {
        Self {
            focus_secs: Self::DEFAULT_FOCUS_SECS,
            short_break_secs: Self::DEFAULT_SHORT_BREAK_SECS,
            long_break_secs: Self::DEFAULT_LONG_BREAK_SECS,
        }
    }
}
