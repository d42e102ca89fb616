mod binding;
mod clock;
mod engine;
mod mode;
mod registry;
mod state;

pub use binding::TimerBinding;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{TimerService, TimerServiceBuilder, TICK_INTERVAL};
pub use mode::{ModeDurations, TimerMode};
pub use registry::{ListenerId, Subscription};
pub use state::{
    remaining_secs_until, restore, PersistedSnapshot, RestorePolicy, Restored, TimerState,
    DEFAULT_STALE_AFTER_MS,
};
