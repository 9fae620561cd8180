//! Observability: tracing initialization.
//!
//! Reads `GROUPENV_QUIET`, `GROUPENV_LOG_LEVEL` and `GROUPENV_LOG_JSON` via
//! [`ObservabilityConfig`]. `RUST_LOG` takes precedence when set.

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;

/// Initialize tracing. Call once at process startup; later calls are no-ops.
/// With `GROUPENV_QUIET=1` only WARN and above are logged.
pub fn init_tracing() {
    let cfg = ObservabilityConfig::from_env();
    let level = filter_directive(cfg);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

fn filter_directive(cfg: &ObservabilityConfig) -> String {
    if cfg.quiet {
        "groupenv=warn,groupenv_core=warn,groupenv_runtime=warn".to_string()
    } else if cfg.log_level.contains('=') || cfg.log_level.contains(',') {
        cfg.log_level.clone()
    } else {
        // Bare level such as "debug" applies to every workspace crate
        let lvl = &cfg.log_level;
        format!("groupenv={lvl},groupenv_core={lvl},groupenv_runtime={lvl}")
    }
}
