//! File logger for nexus runs.
//!
//! Everything goes to `~/.nexus/nexus.log`, truncated when the process
//! starts. The threshold comes from, in
//! order: `NEXUS_LOG=<level>`, `--debug` or `NEXUS_DEBUG=1`, else INFO.
//!
//! What the crate logs where:
//! - ERROR: checkpoint writes that failed, work that could not be joined
//! - WARN: corrupt checkpoints, unknown task ids, ignored env values
//! - INFO: execution, batch and resume milestones
//! - DEBUG: every persisted status transition
//! - TRACE: single attempts inside the retry loop

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::Error;

static SINK: OnceLock<PathBuf> = OnceLock::new();
static THRESHOLD: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

const LEVELS: [LogLevel; 5] = [
    LogLevel::Error,
    LogLevel::Warn,
    LogLevel::Info,
    LogLevel::Debug,
    LogLevel::Trace,
];

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LEVELS
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Config(format!("unknown log level {s:?}")))
    }
}

/// Pick the threshold for this process from the flag and environment.
fn threshold_for(debug: bool, env: impl Fn(&str) -> Option<String>) -> LogLevel {
    if let Some(level) = env("NEXUS_LOG").and_then(|v| v.parse().ok()) {
        return level;
    }
    let env_debug = env("NEXUS_DEBUG")
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Log to `~/.nexus/nexus.log`. Without a home directory only the
/// threshold is set and messages are dropped.
pub fn init_with_debug(debug: bool) {
    let level = threshold_for(debug, |key| std::env::var(key).ok());
    match dirs::home_dir() {
        Some(home) => open_sink(&home.join(".nexus").join("nexus.log"), level),
        None => set_level(level),
    }
}

/// The first call in a process wins the file; later calls only move the
/// threshold.
fn open_sink(path: &Path, level: LogLevel) {
    set_level(level);
    if SINK.get().is_some() {
        return;
    }
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let _ = std::fs::write(path, "");
    let _ = SINK.set(path.to_path_buf());
}

pub fn set_level(level: LogLevel) {
    THRESHOLD.store(level as u8, Ordering::SeqCst);
}

pub fn level() -> LogLevel {
    LEVELS[usize::from(THRESHOLD.load(Ordering::Relaxed)).min(LEVELS.len() - 1)]
}

pub fn enabled(level: LogLevel) -> bool {
    level <= self::level()
}

/// Append one line if `level` passes the threshold. Used by the `nlog*`
/// macros.
pub fn write(level: LogLevel, msg: &str) {
    if !enabled(level) {
        return;
    }
    let Some(path) = SINK.get() else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let _ = writeln!(file, "{now} {:<5} {msg}", level.label());
    }
}

/// INFO line.
#[macro_export]
macro_rules! nlog {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! nlog_error {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Error, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! nlog_warn {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! nlog_debug {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Debug) {
            $crate::log::write($crate::log::LogLevel::Debug, &format!($($arg)*))
        }
    };
}

/// Skips formatting entirely unless TRACE is on.
#[macro_export]
macro_rules! nlog_trace {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Trace) {
            $crate::log::write($crate::log::LogLevel::Trace, &format!($($arg)*))
        }
    };
}
