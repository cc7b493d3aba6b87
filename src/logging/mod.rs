//! Logging bootstrap.
//!
//! The crate logs through `tracing`; hosts that want output call
//! [`init_logging`] once at startup. The `SPINDLE_LOG` environment
//! variable overrides the verbosity-derived filter with full env-filter
//! syntax.

use crate::error::{QueryError, Result};
use tracing_subscriber::EnvFilter;

const ENV_FILTER_VAR: &str = "SPINDLE_LOG";

/// Initialize the global `tracing` subscriber.
///
/// `verbosity` maps 0 -> warn, 1 -> info, 2 -> debug, 3+ -> trace;
/// `quiet` drops everything below errors.
pub fn init_logging(verbosity: u8, quiet: bool) -> Result<()> {
    let default_level = if quiet {
        "error"
    } else {
        match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_env(ENV_FILTER_VAR)
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| QueryError::Config(format!("invalid log filter: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| QueryError::Config(format!("logging already initialized: {e}")))
}
