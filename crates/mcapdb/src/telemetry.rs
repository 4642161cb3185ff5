//! Diagnostic tracing setup for host adapters.

use mcapdb_core::{LookupError, Result};
use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `default_filter` (e.g. `"info"` or
/// `"mcapdb=debug"`) is used. This is separate from the call log, which is always
/// written regardless of the tracing level.
///
/// # Errors
/// Returns [`LookupError::Config`] if the filter is invalid or a global subscriber
/// is already installed.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| LookupError::Config(format!("invalid tracing filter: {e}")))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| LookupError::Config(format!("tracing already initialized: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_once() {
        // Whichever call wins, a second installation must be refused.
        let _ = init_tracing("mcapdb=debug");
        assert!(init_tracing("info").is_err());
    }
}
