//! Timer state, its durable snapshot, and the restore-on-startup rules.

use serde::{Deserialize, Serialize};

use super::mode::{ModeDurations, TimerMode};

/// Snapshots older than this are treated as abandoned.
pub const DEFAULT_STALE_AFTER_MS: i64 = 24 * 60 * 60 * 1000;

/// What subscribers see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub remaining_seconds: u64,
    pub is_running: bool,
    pub mode: TimerMode,
}

impl TimerState {
    /// Not running, full duration of `mode`.
    pub fn idle(mode: TimerMode, durations: &ModeDurations) -> Self {
        Self {
            remaining_seconds: durations.secs(mode),
            is_running: false,
            mode,
        }
    }
}

/// Durable representation written on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    /// Absolute end of the running countdown (epoch ms).
    pub end_time: Option<i64>,
    pub is_running: bool,
    pub current_timer_type: TimerMode,
    /// Seconds left at `saved_at`.
    pub current_time_left: u64,
    pub saved_at: i64,
}

/// How a paused snapshot is treated when restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestorePolicy {
    /// Paused time stays paused across restarts.
    #[default]
    Preserve,
    /// Wall-clock time since the save is charged against paused time too.
    Decay,
}

/// Outcome of [`restore`]: the state plus, when running, its end time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restored {
    pub state: TimerState,
    pub end_ms: Option<i64>,
}

impl Restored {
    fn fresh(durations: &ModeDurations) -> Self {
        Self {
            state: TimerState::idle(TimerMode::Focus, durations),
            end_ms: None,
        }
    }
}

/// Seconds left until `end_ms`, rounded up and clamped at zero.
pub fn remaining_secs_until(end_ms: i64, now_ms: i64) -> u64 {
    let left_ms = end_ms.saturating_sub(now_ms);
    if left_ms <= 0 {
        return 0;
    }
    // `left_ms` is positive, so the cast is lossless.
    (left_ms as u64).div_ceil(1000)
}

/// Rebuild engine state from a stored snapshot.
pub fn restore(
    snapshot: Option<&PersistedSnapshot>,
    now_ms: i64,
    durations: &ModeDurations,
    policy: RestorePolicy,
    stale_after_ms: i64,
) -> Restored {
    let Some(snap) = snapshot else {
        return Restored::fresh(durations);
    };

    // Clock skew can put `saved_at` in the future; count that as no time passed.
    let elapsed_ms = now_ms.saturating_sub(snap.saved_at).max(0);
    if elapsed_ms > stale_after_ms {
        tracing::info!(elapsed_ms, "discarding stale timer snapshot");
        return Restored::fresh(durations);
    }

    let stored_ms = i64::try_from(snap.current_time_left.saturating_mul(1000)).unwrap_or(i64::MAX);
    let mode = snap.current_timer_type;

    if snap.is_running {
        let left_ms = stored_ms.saturating_sub(elapsed_ms);
        if left_ms <= 0 {
            tracing::info!(%mode, "countdown finished while not running; starting fresh");
            return Restored::fresh(durations);
        }
        let end_ms = now_ms.saturating_add(left_ms);
        return Restored {
            state: TimerState {
                remaining_seconds: remaining_secs_until(end_ms, now_ms),
                is_running: true,
                mode,
            },
            end_ms: Some(end_ms),
        };
    }

    let remaining_seconds = match policy {
        RestorePolicy::Preserve => snap.current_time_left,
        RestorePolicy::Decay => {
            let elapsed_secs = u64::try_from(elapsed_ms / 1000).unwrap_or(u64::MAX);
            snap.current_time_left.saturating_sub(elapsed_secs)
        }
    };
    Restored {
        state: TimerState {
            remaining_seconds,
            is_running: false,
            mode,
        },
        end_ms: None,
    }
}
