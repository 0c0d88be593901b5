//! Logging utilities

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize logging with a default level, keeping `RUST_LOG` overrides.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_level(level: LevelFilter) {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// Log a scripting failure together with its traceback text
pub fn log_script_failure(context: &str, message: &str, traceback: &str) {
    if traceback.is_empty() {
        error!("{context}: {message}");
    } else {
        error!("{context}: {message}\n{traceback}");
    }
}
