#![deny(missing_docs)]
//! Shared logging utilities for the ratesync workspace.
//!
//! This crate provides the `sync_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger.

use std::cell::Cell;

thread_local! {
    /// Thread-local storage for the current driver tick count.
    static DRIVER_TICK: Cell<u64> = const { Cell::new(0) };
}

/// Sets the driver tick count for the current thread.
/// The sync driver calls this once per check tick.
pub fn set_tick(tick: u64) {
    DRIVER_TICK.with(|v| v.set(tick));
}

/// Retrieves the driver tick count for the current thread.
/// Returns 0 outside of a running driver.
pub fn current_tick() -> u64 {
    DRIVER_TICK.with(|v| v.get())
}

/// Logs a trace-level message tagged with the current driver tick.
#[macro_export]
macro_rules! sync_trace {
    ($($arg:tt)*) => {{
        log::trace!("[t{}] {}", $crate::current_tick(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message tagged with the current driver tick.
#[macro_export]
macro_rules! sync_debug {
    ($($arg:tt)*) => {{
        log::debug!("[t{}] {}", $crate::current_tick(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message tagged with the current driver tick.
#[macro_export]
macro_rules! sync_info {
    ($($arg:tt)*) => {{
        log::info!("[t{}] {}", $crate::current_tick(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message tagged with the current driver tick.
#[macro_export]
macro_rules! sync_warn {
    ($($arg:tt)*) => {{
        log::warn!("[t{}] {}", $crate::current_tick(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message tagged with the current driver tick.
#[macro_export]
macro_rules! sync_error {
    ($($arg:tt)*) => {{
        log::error!("[t{}] {}", $crate::current_tick(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Another test may already own the global logger.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
