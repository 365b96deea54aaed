//! Per-module switchable logging.
//!
//! A module opts in by defining two constants and then using the macros,
//! which are exported at the crate root:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "screenmind::pipeline";
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("run {} accepted", run_id);
//! ```
//! `LOG_TARGET` becomes the `log` record target, so `RUST_LOG=screenmind::pipeline=debug`
//! narrows output to that module.

#[doc(hidden)]
#[macro_export]
macro_rules! __log_gated {
    ($level:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::log!(target: LOG_TARGET, $level, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::__log_gated!(log::Level::Debug, $($arg)*) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::__log_gated!(log::Level::Info, $($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::__log_gated!(log::Level::Warn, $($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::__log_gated!(log::Level::Error, $($arg)*) };
}

/// Initialise `env_logger` once for the process. `RUST_LOG` still wins over
/// the chosen default level.
pub fn init(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// `SCREENMIND_DEBUG=1` or `SCREENMIND_DEBUG=true` turns on debug output.
pub fn debug_from_env() -> bool {
    std::env::var("SCREENMIND_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
