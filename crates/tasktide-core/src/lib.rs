//! # Tasktide Core Library
//!
//! The focus timer behind the Tasktide task tracker. One countdown per
//! process, shared by every surface that shows it, surviving restarts
//! through a stored snapshot.
//!
//! ## Architecture
//!
//! - **Timer Engine**: a wall-clock-based state machine. Remaining time is
//!   derived from an absolute end timestamp and refreshed by a 1-second tick
//! - **Binding**: per-surface cached view over the engine's notifications
//! - **Storage**: SQLite key-value snapshot store and TOML configuration
//! - **Audio**: start and alarm cues, best effort
//!
//! ## Key Components
//!
//! - [`TimerService`]: Core timer state machine
//! - [`TimerBinding`]: Surface adapter with mount/unmount lifecycle
//! - [`Database`]: Snapshot persistence
//! - [`Config`]: Application configuration management

pub mod audio;
pub mod error;
pub mod events;
pub mod storage;
pub mod timer;

pub use audio::{AudioCue, CuePlayer, NullPlayer};
pub use error::{AudioError, ConfigError, CoreError, StorageError};
pub use events::Event;
pub use storage::{Config, Database, MemoryStore, SnapshotStore};
pub use timer::{TimerBinding, TimerMode, TimerService, TimerState};
