#![deny(missing_docs)]
//! Shared logging utilities for the stagewatch workspace.
//!
//! This crate provides the `sw_*` logging macros used across the codebase,
//! a per-thread job context that prefixes log lines with the job being
//! observed, and a minimal test initializer for the global logger.

use std::cell::RefCell;

#[doc(hidden)]
pub use log;

thread_local! {
    /// Job id tagged onto every `sw_*` log line emitted from this thread.
    static JOB_CONTEXT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Sets (or clears) the job context for the current thread.
pub fn set_job_context(job_id: Option<&str>) {
    JOB_CONTEXT.with(|ctx| *ctx.borrow_mut() = job_id.map(ToOwned::to_owned));
}

/// Returns the job context of the current thread, if any.
pub fn job_context() -> Option<String> {
    JOB_CONTEXT.with(|ctx| ctx.borrow().clone())
}

/// Restores the previous job context when dropped.
///
/// Async tasks hop between worker threads, so the context should be entered
/// for a synchronous section only and never held across an `.await`.
#[must_use = "the context is cleared as soon as the guard is dropped"]
pub struct JobContextGuard {
    previous: Option<String>,
}

impl JobContextGuard {
    /// Tags the current thread with `job_id` until the guard is dropped.
    pub fn enter(job_id: &str) -> Self {
        let previous = job_context();
        set_job_context(Some(job_id));
        Self { previous }
    }
}

impl Drop for JobContextGuard {
    fn drop(&mut self) {
        set_job_context(self.previous.as_deref());
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __sw_log {
    ($level:expr, $($arg:tt)*) => {{
        match $crate::job_context() {
            Some(job) => $crate::log::log!($level, "[job {}] {}", job, format_args!($($arg)*)),
            None => $crate::log::log!($level, $($arg)*),
        }
    }};
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! sw_trace {
    ($($arg:tt)*) => {{
        $crate::__sw_log!($crate::log::Level::Trace, $($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! sw_debug {
    ($($arg:tt)*) => {{
        $crate::__sw_log!($crate::log::Level::Debug, $($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! sw_info {
    ($($arg:tt)*) => {{
        $crate::__sw_log!($crate::log::Level::Info, $($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! sw_warn {
    ($($arg:tt)*) => {{
        $crate::__sw_log!($crate::log::Level::Warn, $($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! sw_error {
    ($($arg:tt)*) => {{
        $crate::__sw_log!($crate::log::Level::Error, $($arg)*);
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
