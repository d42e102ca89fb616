//! Timer engine implementation.
//!
//! [`TimerService`] is the single source of truth for the countdown in a
//! process. It is a cheap handle: clone it and hand it to every surface that
//! needs the timer. All clones share one state.
//!
//! Remaining time is always derived from an absolute end timestamp, never
//! decremented, so a late or skipped tick cannot introduce drift.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> (Paused | Completed) -> Running ...
//!            \-> Running (mode switch restarts the countdown)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let timer = TimerService::new(&config, Database::open()?, NullPlayer)?;
//! let _sub = timer.subscribe(|s| println!("{}s left", s.remaining_seconds));
//! timer.start(TimerMode::Focus, None);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::clock::{Clock, SystemClock};
use super::mode::{ModeDurations, TimerMode};
use super::registry::{Listener, ListenerRegistry, Subscription};
use super::state::{
    remaining_secs_until, restore, PersistedSnapshot, RestorePolicy, TimerState,
    DEFAULT_STALE_AFTER_MS,
};
use crate::audio::{AudioCue, CuePlayer};
use crate::error::ConfigError;
use crate::events::Event;
use crate::storage::{Config, SnapshotStore};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

struct Core {
    state: TimerState,
    /// Absolute end of the running countdown (epoch ms). `None` unless running.
    end_ms: Option<i64>,
    /// At most one tick task is ever alive.
    tick_task: Option<JoinHandle<()>>,
    /// Bumped on every state change; orders publication.
    version: u64,
    /// Snapshot of the latest persisting transition, written by the next drain.
    unsaved: Option<PersistedSnapshot>,
}

impl Core {
    fn persisted(&self, now_ms: i64) -> PersistedSnapshot {
        PersistedSnapshot {
            end_time: self.end_ms,
            is_running: self.state.is_running,
            current_timer_type: self.state.mode,
            current_time_left: self.state.remaining_seconds,
            saved_at: now_ms,
        }
    }

    /// Record a change. `persist` queues the new snapshot for the store.
    fn commit(&mut self, now_ms: i64, persist: bool) {
        self.version += 1;
        if persist {
            self.unsaved = Some(self.persisted(now_ms));
        }
    }

    fn cancel_tick(&mut self) {
        if let Some(task) = self.tick_task.take() {
            task.abort();
        }
    }

    fn stop_at(&mut self, mode: TimerMode, remaining_seconds: u64) {
        self.cancel_tick();
        self.state = TimerState {
            remaining_seconds,
            is_running: false,
            mode,
        };
        self.end_ms = None;
    }
}

/// Publication bookkeeping. Only the draining thread delivers to listeners
/// and writes to the store.
#[derive(Default)]
struct Publisher {
    draining: bool,
    /// A change arrived while another drain was in progress.
    pending: bool,
    /// A new subscriber is waiting for its first state.
    replay: bool,
    delivered: u64,
}

/// Releases the drain if a listener or the store panics mid-delivery.
struct Draining<'a>(&'a Mutex<Publisher>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut publisher = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            publisher.draining = false;
            publisher.pending = false;
        }
    }
}

struct Shared {
    core: Mutex<Core>,
    publisher: Mutex<Publisher>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    store: Box<dyn SnapshotStore>,
    player: Box<dyn CuePlayer>,
    clock: Arc<dyn Clock>,
    durations: ModeDurations,
}

impl Drop for Shared {
    // Last handle gone: the process-exit hook.
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        core.cancel_tick();
        let snapshot = core.persisted(self.clock.now_ms());
        if let Err(e) = self.store.save(&snapshot) {
            tracing::warn!(error = %e, "failed to persist timer state on shutdown");
        }
    }
}

/// Process-wide countdown engine.
#[derive(Clone)]
pub struct TimerService {
    shared: Arc<Shared>,
}

impl TimerService {
    /// Build an engine from configuration using the system clock.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if a configured duration is zero.
    pub fn new(
        config: &Config,
        store: impl SnapshotStore + 'static,
        player: impl CuePlayer + 'static,
    ) -> Result<Self, ConfigError> {
        Ok(Self::builder()
            .durations(config.timer.durations()?)
            .restore_policy(config.timer.restore_policy())
            .stale_after_ms(config.timer.stale_after_ms())
            .store(store)
            .player(player)
            .build())
    }

    pub fn builder() -> TimerServiceBuilder {
        TimerServiceBuilder::default()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn current_state(&self) -> TimerState {
        self.lock_core().state
    }

    pub fn is_running(&self) -> bool {
        self.lock_core().state.is_running
    }

    pub fn durations(&self) -> ModeDurations {
        self.shared.durations
    }

    /// True when the remaining time equals the current mode's full duration.
    pub fn is_at_default(&self) -> bool {
        let state = self.current_state();
        state.remaining_seconds == self.shared.durations.secs(state.mode)
    }

    /// Absolute end of the running countdown, in epoch ms.
    pub fn end_ms(&self) -> Option<i64> {
        self.lock_core().end_ms
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_listeners().len()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start or resume counting down in `mode`.
    ///
    /// `duration` overrides the mode's configured length when a fresh
    /// countdown begins; it is ignored when a paused countdown resumes.
    pub fn start(&self, mode: TimerMode, duration: Option<u64>) -> Option<Event> {
        let now = self.now_ms();
        let duration = duration.filter(|secs| *secs > 0);
        let fresh_secs = duration.unwrap_or_else(|| self.shared.durations.secs(mode));

        let event = {
            let mut core = self.lock_core();
            let (remaining, resumed) = if core.state.is_running {
                if core.state.mode == mode {
                    tracing::debug!(%mode, "start ignored: already running");
                    return None;
                }
                tracing::info!(from = %core.state.mode, to = %mode, "switching mode while running");
                (fresh_secs, false)
            } else if core.state.mode == mode && core.state.remaining_seconds > 0 {
                (core.state.remaining_seconds, true)
            } else {
                (fresh_secs, false)
            };

            core.state = TimerState {
                remaining_seconds: remaining,
                is_running: true,
                mode,
            };
            core.end_ms = Some(now.saturating_add(secs_to_ms(remaining)));
            core.commit(now, true);
            self.schedule_tick(&mut core);

            tracing::info!(%mode, remaining, resumed, "timer started");
            Event::TimerStarted {
                mode,
                remaining_secs: remaining,
                resumed,
                at: at(now),
            }
        };

        self.publish();
        self.play(AudioCue::Start);
        Some(event)
    }

    /// Stop counting, keeping the remaining time. No-op when not running.
    pub fn pause(&self) -> Option<Event> {
        let now = self.now_ms();
        let event = {
            let mut core = self.lock_core();
            if !core.state.is_running {
                tracing::debug!("pause ignored: not running");
                return None;
            }
            // Flush wall-clock time since the last tick.
            let remaining = core
                .end_ms
                .map(|end| remaining_secs_until(end, now))
                .unwrap_or(core.state.remaining_seconds);
            let mode = core.state.mode;
            core.stop_at(mode, remaining);
            core.commit(now, true);

            tracing::info!(%mode, remaining, "timer paused");
            Event::TimerPaused {
                mode,
                remaining_secs: remaining,
                at: at(now),
            }
        };

        self.publish();
        Some(event)
    }

    /// Stop and refill to the full duration of `mode`, or of the current mode.
    pub fn reset(&self, mode: Option<TimerMode>) -> Option<Event> {
        let now = self.now_ms();
        let event = {
            let mut core = self.lock_core();
            let mode = mode.unwrap_or(core.state.mode);
            let full = self.shared.durations.secs(mode);
            core.stop_at(mode, full);
            core.commit(now, true);

            tracing::info!(%mode, "timer reset");
            Event::TimerReset {
                mode,
                remaining_secs: full,
                at: at(now),
            }
        };

        self.publish();
        Some(event)
    }

    /// Pause if running, otherwise start `mode` (default: the current mode).
    pub fn toggle(&self, mode: Option<TimerMode>) -> Option<Event> {
        let state = self.current_state();
        if state.is_running {
            self.pause()
        } else {
            self.start(mode.unwrap_or(state.mode), None)
        }
    }

    /// Switch to `mode` with its full duration, without starting.
    ///
    /// A running countdown in another mode is stopped.
    pub fn set_mode(&self, mode: TimerMode) -> Option<Event> {
        let now = self.now_ms();
        let event = {
            let mut core = self.lock_core();
            let from = core.state.mode;
            if from == mode {
                return None;
            }
            let full = self.shared.durations.secs(mode);
            core.stop_at(mode, full);
            core.commit(now, true);

            tracing::info!(%from, to = %mode, "timer mode changed");
            Event::ModeChanged {
                from,
                to: mode,
                remaining_secs: full,
                at: at(now),
            }
        };

        self.publish();
        Some(event)
    }

    /// Recompute remaining time from the wall clock.
    ///
    /// Returns `Some(Event::TimerCompleted)` when the countdown hits zero.
    /// Called once a second by the scheduled tick task; safe to call at any
    /// time from elsewhere.
    pub fn tick(&self) -> Option<Event> {
        let now = self.now_ms();
        let completed = {
            let mut core = self.lock_core();
            if !core.state.is_running {
                return None;
            }
            let Some(end) = core.end_ms else {
                return None;
            };
            let remaining = remaining_secs_until(end, now);
            if remaining > 0 {
                if remaining == core.state.remaining_seconds {
                    return None;
                }
                core.state.remaining_seconds = remaining;
                core.commit(now, false);
                None
            } else {
                let mode = core.state.mode;
                core.stop_at(mode, 0);
                core.commit(now, true);
                tracing::info!(%mode, "timer completed");
                Some(mode)
            }
        };

        self.publish();
        let mode = completed?;
        self.play(AudioCue::Alarm);
        Some(Event::TimerCompleted { mode, at: at(now) })
    }

    /// Register `listener`. It is called right away with the current state,
    /// then after every change until the returned handle is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TimerState) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let id = self.lock_listeners().insert(Arc::clone(&listener));
        let subscription = Subscription::new(id, &self.shared.listeners);
        self.drain(Some(listener));
        subscription
    }

    /// Write the current state to the snapshot store now.
    pub fn persist(&self) {
        {
            let now = self.now_ms();
            let mut core = self.lock_core();
            core.unsaved = Some(core.persisted(now));
        }
        self.publish();
    }

    /// Pause and drop every subscriber. For full teardown only.
    pub fn cleanup(&self) {
        self.pause();
        self.lock_listeners().clear();
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn now_ms(&self) -> i64 {
        self.shared.clock.now_ms()
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.shared.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, ListenerRegistry> {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_publisher(&self) -> MutexGuard<'_, Publisher> {
        self.shared
            .publisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self) {
        self.drain(None);
    }

    /// Deliver the newest state to listeners, then write any queued snapshot.
    ///
    /// One thread drains at a time. A change made while another thread is
    /// draining, or from inside a listener, is left to that drain, so
    /// listeners and the store never see an older state after a newer one.
    /// `first` is a new subscriber owed the current state even if nothing
    /// changed.
    fn drain(&self, mut first: Option<Listener>) {
        {
            let mut publisher = self.lock_publisher();
            if publisher.draining {
                publisher.pending = true;
                publisher.replay |= first.is_some();
                return;
            }
            publisher.draining = true;
        }
        let _draining = Draining(&self.shared.publisher);

        loop {
            let (state, version, snapshot) = {
                let mut core = self.lock_core();
                (core.state, core.version, core.unsaved.take())
            };
            let fresh = {
                let mut publisher = self.lock_publisher();
                let fresh = version > publisher.delivered || std::mem::take(&mut publisher.replay);
                publisher.delivered = version;
                fresh
            };

            // A fresh notify already reaches the new subscriber.
            let newcomer = first.take();
            if fresh {
                self.notify(&state);
            } else if let Some(listener) = newcomer {
                listener(&state);
            }
            if let Some(snapshot) = snapshot {
                self.save(&snapshot);
            }

            let mut publisher = self.lock_publisher();
            if !publisher.pending {
                publisher.draining = false;
                return;
            }
            publisher.pending = false;
        }
    }

    /// Called with the state lock released so listeners may call back in.
    fn notify(&self, state: &TimerState) {
        let listeners = self.lock_listeners().snapshot();
        for listener in listeners {
            listener(state);
        }
    }

    fn save(&self, snapshot: &PersistedSnapshot) {
        if let Err(e) = self.shared.store.save(snapshot) {
            tracing::warn!(error = %e, "failed to persist timer state");
        }
    }

    fn play(&self, cue: AudioCue) {
        if let Err(e) = self.shared.player.play(cue) {
            tracing::warn!(?cue, error = %e, "audio cue failed");
        }
    }

    /// Replace any tick task with a fresh one. Without a tokio runtime the
    /// caller has to drive [`TimerService::tick`] itself.
    fn schedule_tick(&self, core: &mut Core) {
        core.cancel_tick();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no tokio runtime; tick must be driven manually");
            return;
        };

        let weak = Arc::downgrade(&self.shared);
        core.tick_task = Some(runtime.spawn(async move {
            let start = tokio::time::Instant::now() + TICK_INTERVAL;
            let mut interval = tokio::time::interval_at(start, TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let service = TimerService { shared };
                service.tick();
                if !service.is_running() {
                    break;
                }
            }
        }));
    }
}

impl std::fmt::Debug for TimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerService")
            .field("state", &self.current_state())
            .field("durations", &self.shared.durations)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TimerService`]; every piece has a default.
pub struct TimerServiceBuilder {
    clock: Arc<dyn Clock>,
    store: Option<Box<dyn SnapshotStore>>,
    player: Option<Box<dyn CuePlayer>>,
    durations: ModeDurations,
    restore_policy: RestorePolicy,
    stale_after_ms: i64,
}

impl Default for TimerServiceBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            store: None,
            player: None,
            durations: ModeDurations::default(),
            restore_policy: RestorePolicy::default(),
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
        }
    }
}

impl TimerServiceBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(mut self, store: impl SnapshotStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn player(mut self, player: impl CuePlayer + 'static) -> Self {
        self.player = Some(Box::new(player));
        self
    }

    pub fn durations(mut self, durations: ModeDurations) -> Self {
        self.durations = durations;
        self
    }

    pub fn restore_policy(mut self, policy: RestorePolicy) -> Self {
        self.restore_policy = policy;
        self
    }

    pub fn stale_after_ms(mut self, ms: i64) -> Self {
        self.stale_after_ms = ms;
        self
    }

    /// Restore from the store and, if the restored countdown is running,
    /// schedule its tick.
    pub fn build(self) -> TimerService {
        let store = self
            .store
            .unwrap_or_else(|| Box::new(crate::storage::MemoryStore::new()));
        let player = self
            .player
            .unwrap_or_else(|| Box::new(crate::audio::NullPlayer));

        let now = self.clock.now_ms();
        let snapshot = store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read timer snapshot; using defaults");
            None
        });
        let restored = restore(
            snapshot.as_ref(),
            now,
            &self.durations,
            self.restore_policy,
            self.stale_after_ms,
        );
        tracing::debug!(state = ?restored.state, "timer state restored");

        let service = TimerService {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    state: restored.state,
                    end_ms: restored.end_ms,
                    tick_task: None,
                    version: 0,
                    unsaved: None,
                }),
                publisher: Mutex::new(Publisher::default()),
                listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
                store,
                player,
                clock: self.clock,
                durations: self.durations,
            }),
        };

        if restored.state.is_running {
            let mut core = service.lock_core();
            service.schedule_tick(&mut core);
        }
        service
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

fn at(now_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now)
}
