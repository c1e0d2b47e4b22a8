//! Kernel-style print macros for asyncwq
//!
//! Thread-safe leveled output to stderr, similar to the kernel's printk.
//! Leveled lines carry the emitting thread's name so a message can be
//! attributed to the pool worker that produced it.
//!
//! # Environment Variables
//!
//! - `AWQ_LOG_LEVEL=<level>` - off|error|warn|info|debug|trace or 0-5
//! - `AWQ_FLUSH_EPRINT=1` - Flush stderr after each print
//! - `AWQ_LOG_THREAD=0` - Omit the thread name from leveled lines
//!
//! # Usage
//!
//! ```ignore
//! use asyncwq_core::{kinfo, ktrace};
//!
//! kinfo!("workqueue {} allocated", name);
//! ktrace!("work queued: wq={} work={:p}", name, ptr);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Once;

/// Log levels
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or digit; unknown input yields `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static INIT: Once = Once::new();
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static THREAD_ENABLED: AtomicBool = AtomicBool::new(true);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Initialize logging from environment variables
///
/// Runs once; called implicitly by the first log statement.
/// Programmatic setters called afterwards win.
pub fn init() {
    INIT.call_once(|| {
        if let Ok(val) = std::env::var("AWQ_FLUSH_EPRINT") {
            FLUSH_ENABLED.store(
                matches!(val.as_str(), "1" | "true" | "yes" | "on"),
                Ordering::Relaxed,
            );
        }
        if let Ok(val) = std::env::var("AWQ_LOG_THREAD") {
            THREAD_ENABLED.store(
                !matches!(val.as_str(), "0" | "false" | "no" | "off"),
                Ordering::Relaxed,
            );
        }
        if let Some(level) = std::env::var("AWQ_LOG_LEVEL")
            .ok()
            .and_then(|v| LogLevel::parse(&v))
        {
            LOG_LEVEL.store(level as u8, Ordering::Relaxed);
        }
    });
}

#[inline]
pub fn flush_enabled() -> bool {
    init();
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    init();
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn set_log_level(level: LogLevel) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_flush_enabled(enabled: bool) {
    init();
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn set_thread_enabled(enabled: bool) {
    init();
    THREAD_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Check if a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Callers check `level_enabled` first
#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    let thread = std::thread::current();
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    if THREAD_ENABLED.load(Ordering::Relaxed) {
        let _ = write!(handle, "[{}] ", thread.name().unwrap_or("?"));
    }
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Print to stderr with newline, unconditionally
#[macro_export]
macro_rules! kprintln {
    () => {{
        $crate::kprint::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::kprint::_kprintln_impl(format_args!($($arg)*));
    }};
}

/// Leveled log line; arguments are only formatted when the level is on
#[doc(hidden)]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => {{
        let level = $crate::kprint::LogLevel::$level;
        if $crate::kprint::level_enabled(level) {
            $crate::kprint::_klog_impl(level, format_args!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::__klog!(Error, $($arg)*) };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::__klog!(Warn, $($arg)*) };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::__klog!(Info, $($arg)*) };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::__klog!(Debug, $($arg)*) };
}

/// Trace level log; the per-work-item trace points use this
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::__klog!(Trace, $($arg)*) };
}
