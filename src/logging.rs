//! Tracing subscriber setup for the binary.
//!
//! Library code only emits `tracing` events; nothing is printed unless the
//! binary installs a subscriber here. Output goes to stderr so stdout stays
//! clean for JSON results.

use crate::error::{ServiceError, ServiceResult};
use std::str::FromStr;
use tracing::Level;

/// Parse a configured level name.
pub fn parse_level(level: &str) -> ServiceResult<Level> {
    Level::from_str(level.trim()).map_err(|_| ServiceError::Config {
        reason: format!(
            "logging.level must be one of trace, debug, info, warn, error; got '{level}'"
        ),
    })
}

/// Install the global subscriber. `debug` forces the debug level.
///
/// Calling this twice is harmless; the first subscriber stays in place.
pub fn init(level: &str, debug: bool) -> ServiceResult<()> {
    let level = if debug { Level::DEBUG } else { parse_level(level)? };

    // Already installed (tests, embedding applications)
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .try_init();
    Ok(())
}
