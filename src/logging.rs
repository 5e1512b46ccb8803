// ABOUTME: tracing subscriber setup driven by the numeric verbosity flag
// ABOUTME: Logs go to stdout or to a file chosen on the command line

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Default verbosity: warnings and errors only.
pub const DEFAULT_VERBOSITY: u8 = 4;

/// Maps syslog-style verbosity (3 = errors, 4 = warnings, 6 = info,
/// 7 = debug) to a level filter.
pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0..=3 => LevelFilter::ERROR,
        4 => LevelFilter::WARN,
        5 | 6 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

/// Initialize logging
///
/// 1. RUST_LOG environment variable has highest precedence
/// 2. the verbosity level is used if RUST_LOG is not set
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(level_for_verbosity(verbosity).into())
    });

    let result = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Could not open {:?} for writing", path))?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stdout)
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
