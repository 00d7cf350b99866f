//! Log subscriber setup for the process-level entry point.

use crate::error::{Error, Result};
use std::env;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install a global stderr subscriber.
///
/// Directives come from `RUST_LOG` when it is set and valid, otherwise the
/// level is `warn`. With `debug` the default level is raised to `debug` on
/// top of either; targets named explicitly in `RUST_LOG` keep their level.
pub fn init_logging(debug: bool) -> Result<()> {
    let filter = build_filter(debug, env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .compact()
        .try_init()
        .map_err(|e| Error::Internal(format!("failed to install log subscriber: {e}")))
}

fn build_filter(debug: bool, directives: Option<&str>) -> EnvFilter {
    let filter = directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    if debug {
        filter.add_directive(LevelFilter::DEBUG.into())
    } else {
        filter
    }
}
