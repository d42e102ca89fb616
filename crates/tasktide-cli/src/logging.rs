//! Stderr logging for the CLI.
//!
//! Stdout carries JSON for scripts, so every log line goes to stderr.
//! `TASKTIDE_LOG` takes an `EnvFilter` directive and wins over `-v`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "warn",
        1 => "info,tasktide_core=debug,tasktide_cli=debug",
        _ => "debug,tasktide_core=trace,tasktide_cli=trace",
    };
    let filter = EnvFilter::try_from_env("TASKTIDE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(filter)
        .try_init();
}
