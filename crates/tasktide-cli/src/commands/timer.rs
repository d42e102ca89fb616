use clap::Subcommand;
use serde_json::json;
use tasktide_core::audio::player_from_config;
use tasktide_core::error::{CoreError, Result};
use tasktide_core::storage::data_dir;
use tasktide_core::{Config, Database, Event, TimerBinding, TimerMode, TimerService, TimerState};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start or resume a countdown
    Start {
        /// focus, short-break or long-break (default: current mode)
        #[arg(long, short)]
        mode: Option<TimerMode>,
        /// Override the mode's length for a fresh countdown, in seconds
        #[arg(long, short)]
        duration: Option<u64>,
    },
    /// Pause the running countdown
    Pause,
    /// Stop and refill to the full duration
    Reset {
        #[arg(long, short)]
        mode: Option<TimerMode>,
    },
    /// Pause if running, otherwise start
    Toggle {
        #[arg(long, short)]
        mode: Option<TimerMode>,
    },
    /// Switch mode without starting
    Mode {
        mode: TimerMode,
    },
    /// Print current timer state as JSON
    Status,
    /// Follow the countdown, one JSON line per change, until it ends
    Watch {
        /// Mode this view prefers; applied only while the timer is idle
        #[arg(long, short)]
        mode: Option<TimerMode>,
    },
}

fn open_engine() -> Result<TimerService> {
    let config = Config::load_or_default();
    let dir = data_dir()?;
    let player = player_from_config(&config.sounds, &dir);
    let db = Database::open()?;
    Ok(TimerService::new(&config, db, player)?)
}

fn clock_face(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn state_json(state: &TimerState, at_default: bool) -> serde_json::Value {
    json!({
        "mode": state.mode,
        "label": state.mode.label(),
        "remainingSeconds": state.remaining_seconds,
        "isRunning": state.is_running,
        "atDefault": at_default,
        "display": clock_face(state.remaining_seconds),
    })
}

fn print_event(event: Option<Event>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}

pub fn run(action: TimerAction) -> Result<()> {
    // The engine is built inside the runtime so a running countdown gets its tick task.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let engine = open_engine()?;

        match action {
            TimerAction::Start { mode, duration } => {
                let mode = mode.unwrap_or(engine.current_state().mode);
                print_event(engine.start(mode, duration))?;
            }
            TimerAction::Pause => print_event(engine.pause())?,
            TimerAction::Reset { mode } => print_event(engine.reset(mode))?,
            TimerAction::Toggle { mode } => print_event(engine.toggle(mode))?,
            TimerAction::Mode { mode } => print_event(engine.set_mode(mode))?,
            TimerAction::Status => {
                let completed = engine.tick();
                let state = engine.current_state();
                let mut out = state_json(&state, engine.is_at_default());
                out["endTime"] = json!(engine.end_ms());
                println!("{}", serde_json::to_string_pretty(&out)?);
                if let Some(event) = completed {
                    println!("{}", serde_json::to_string_pretty(&event)?);
                }
            }
            TimerAction::Watch { mode } => watch(&engine, mode).await?,
        }

        engine.persist();
        Ok::<(), CoreError>(())
    })
}

async fn watch(
    engine: &TimerService,
    mode: Option<TimerMode>,
) -> Result<()> {
    let binding = TimerBinding::mount(engine, mode);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _wakeups = engine.subscribe(move |_| {
        let _ = tx.send(());
    });

    loop {
        tokio::select! {
            changed = rx.recv() => {
                if changed.is_none() {
                    break;
                }
                let state = binding.state();
                println!("{}", state_json(&state, binding.is_at_default()));
                if !state.is_running {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; countdown state saved");
                break;
            }
        }
    }

    binding.unmount();
    Ok(())
}
