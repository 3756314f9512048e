//! Log output for the daemon.
//!
//! Call [`init`] once at startup. The rest of the crate uses the `tracing`
//! macros directly.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

/// Install a subscriber writing to stdout.
///
/// The level comes from `RUST_LOG`, defaulting to INFO, or DEBUG when
/// `verbose` is set.
pub fn init(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
