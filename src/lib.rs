//! # Skinnydip
//!
//! MMU2 string eliminator. Post-processes multi-material G-code sliced by
//! PrusaSlicer so each filament tip is dipped back into the melt zone before
//! it is parked, and optionally drops the hotend to a toolchange temperature
//! during unloads.
//!
//! ## Architecture
//!
//! Skinnydip is organized as a workspace:
//!
//! 1. **skinnydip-core** - line index, tool-activation index, configuration
//!    resolver, site scanner, compiler and renderer
//! 2. **skinnydip-settings** - user configuration (TOML / JSON)
//! 3. **skinnydip** - this crate: logging bootstrap, file job and the CLI

pub mod job;

pub use job::{FileJob, JobOutcome, JobPaths};
pub use skinnydip_core::{Engine, EngineError, EngineOptions, ProcessReport};
pub use skinnydip_settings::{Config, OutputSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging with:
/// - Console output on stderr
/// - RUST_LOG environment variable support
/// - DEBUG as the default level when `verbose`, INFO otherwise
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_level(true)
        .with_line_number(verbose);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
