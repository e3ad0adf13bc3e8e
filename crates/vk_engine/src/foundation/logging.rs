//! Logging setup

pub use log::{debug, error, info, trace, warn};

/// Initialize `env_logger`, honouring `RUST_LOG` and defaulting to `default_level`
///
/// Safe to call more than once; later calls are ignored.
pub fn init(default_level: log::LevelFilter) {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(default_level)
        .parse_default_env()
        .try_init();
}

/// Parse a level name from configuration, falling back to `Info`
pub fn level_from_str(level: &str) -> log::LevelFilter {
    level.parse().unwrap_or(log::LevelFilter::Info)
}
