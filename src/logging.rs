//! Logging initialization
//!
//! Verbosity is resolved once from the configuration and installed as the
//! process subscriber. Components only emit events; none of them reads or
//! changes the level afterwards.

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::ConfigStoreConfig;

static INIT_ONCE: Once = Once::new();

/// Default level for the given debug flag
pub fn default_level(debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` refines the filter when set; otherwise the level follows the
/// `debug` flag. Subsequent calls are no-ops.
pub fn init(config: &ConfigStoreConfig) {
    let level = default_level(config.debug);
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        // Another subscriber may already be installed (e.g. by a test harness)
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_follows_debug_flag() {
        assert_eq!(default_level(true), Level::DEBUG);
        assert_eq!(default_level(false), Level::INFO);
    }

    #[test]
    fn test_init_idempotent() {
        let config = ConfigStoreConfig::in_memory("127.0.0.1:0");
        init(&config);
        init(&config);
    }
}
