//! Per-surface binding over the shared [`TimerService`].
//!
//! A surface (a window, a widget, the CLI's watch loop) mounts a
//! [`TimerBinding`] to get a cached copy of the timer state that follows the
//! engine. Unmounting only detaches the surface; the countdown keeps going.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::engine::TimerService;
use super::mode::TimerMode;
use super::registry::Subscription;
use super::state::TimerState;
use crate::events::Event;

pub struct TimerBinding {
    engine: TimerService,
    view: Arc<Mutex<TimerState>>,
    mounted: Arc<AtomicBool>,
    subscription: Option<Subscription>,
}

impl TimerBinding {
    /// Subscribe to `engine` and adopt its current state.
    ///
    /// `initial_mode` is what the surface would like to show. It is pushed to
    /// the engine only while the engine is idle; a running countdown is never
    /// reset by a surface mounting.
    pub fn mount(engine: &TimerService, initial_mode: Option<TimerMode>) -> Self {
        let current = engine.current_state();
        let view = Arc::new(Mutex::new(current));
        let mounted = Arc::new(AtomicBool::new(true));

        let subscription = {
            let view = Arc::clone(&view);
            let mounted = Arc::clone(&mounted);
            engine.subscribe(move |state| {
                if !mounted.load(Ordering::Acquire) {
                    return;
                }
                *view.lock().unwrap_or_else(PoisonError::into_inner) = *state;
            })
        };

        if let Some(mode) = initial_mode {
            if mode != current.mode && !current.is_running {
                engine.set_mode(mode);
            } else if mode != current.mode {
                tracing::debug!(wanted = %mode, running = %current.mode, "keeping running countdown's mode");
            }
        }

        Self {
            engine: engine.clone(),
            view,
            mounted,
            subscription: Some(subscription),
        }
    }

    /// Last state the engine published to this surface.
    pub fn state(&self) -> TimerState {
        *self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// True when the remaining time equals the mode's configured duration.
    pub fn is_at_default(&self) -> bool {
        let state = self.state();
        state.remaining_seconds == self.engine.durations().secs(state.mode)
    }

    pub fn engine(&self) -> &TimerService {
        &self.engine
    }

    pub fn start(&self, mode: TimerMode, duration: Option<u64>) -> Option<Event> {
        self.engine.start(mode, duration)
    }

    pub fn pause(&self) -> Option<Event> {
        self.engine.pause()
    }

    pub fn reset(&self, mode: Option<TimerMode>) -> Option<Event> {
        self.engine.reset(mode)
    }

    pub fn toggle(&self, mode: Option<TimerMode>) -> Option<Event> {
        self.engine.toggle(mode)
    }

    pub fn set_mode(&self, mode: TimerMode) -> Option<Event> {
        self.engine.set_mode(mode)
    }

    /// Detach from the engine. The engine is not paused or reset.
    pub fn unmount(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        self.mounted.store(false, Ordering::Release);
        self.subscription.take();
    }
}

impl Drop for TimerBinding {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::clock::ManualClock;
    use std::time::Duration;

    fn engine() -> (TimerService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (TimerService::builder().clock(clock.clone()).build(), clock)
    }

    #[test]
    fn mount_adopts_engine_state() {
        let (timer, _) = engine();
        timer.start(TimerMode::ShortBreak, None);
        let binding = TimerBinding::mount(&timer, None);
        assert_eq!(binding.state(), timer.current_state());
        assert!(binding.is_at_default());
    }

    #[test]
    fn view_follows_engine_transitions() {
        let (timer, clock) = engine();
        let binding = TimerBinding::mount(&timer, None);
        binding.start(TimerMode::Focus, None);
        clock.advance(Duration::from_secs(61));
        timer.tick();
        assert_eq!(binding.state().remaining_seconds, 1439);
        assert!(binding.state().is_running);
        assert!(!binding.is_at_default());
    }

    #[test]
    fn unmount_leaves_engine_running() {
        let (timer, _) = engine();
        let binding = TimerBinding::mount(&timer, None);
        binding.start(TimerMode::Focus, None);
        assert_eq!(timer.subscriber_count(), 1);
        binding.unmount();
        assert_eq!(timer.subscriber_count(), 0);
        assert!(timer.is_running());
    }

    #[test]
    fn unmounted_view_is_frozen() {
        let (timer, _) = engine();
        let mut binding = TimerBinding::mount(&timer, None);
        binding.detach();
        assert!(!binding.is_mounted());
        timer.start(TimerMode::LongBreak, None);
        assert_eq!(binding.state().mode, TimerMode::Focus);
        assert!(!binding.state().is_running);
    }

    #[test]
    fn initial_mode_reconciled_when_idle() {
        let (timer, _) = engine();
        let binding = TimerBinding::mount(&timer, Some(TimerMode::LongBreak));
        assert_eq!(timer.current_state().mode, TimerMode::LongBreak);
        assert_eq!(binding.state().remaining_seconds, 900);
    }

    #[test]
    fn initial_mode_never_resets_running_countdown() {
        let (timer, clock) = engine();
        timer.start(TimerMode::Focus, None);
        clock.advance(Duration::from_secs(100));
        timer.tick();
        let binding = TimerBinding::mount(&timer, Some(TimerMode::ShortBreak));
        let s = binding.state();
        assert_eq!(s.mode, TimerMode::Focus);
        assert_eq!(s.remaining_seconds, 1400);
        assert!(s.is_running);
    }
}
