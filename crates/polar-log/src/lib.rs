//! A small, zero-dependency logging crate for the polar memory crates.
//!
//! Messages carry the module path of the call site as their target, and
//! a filter made of directives decides per target which levels are shown.
//! The filter is read from the `POLAR_LOG` environment variable by
//! [`init_from_env`], or set programmatically with [`set_filter`] /
//! [`set_level`].
//!
//! # Example
//!
//! ```
//! use polar_log::{debug, info, trace, Level};
//!
//! polar_log::set_filter("polar_mem=trace,info").unwrap();
//!
//! let slabs = 3;
//! info!("allocator holds {} slabs", slabs);
//! debug!("this is hidden outside polar_mem");
//! trace!("so is this");
//!
//! assert!(polar_log::enabled(Level::Trace, "polar_mem::slab"));
//! assert!(!polar_log::enabled(Level::Debug, "polar_adt::tree"));
//! ```

use std::fmt::{self, Arguments};
use std::io::{IsTerminal, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock};

/// Environment variable consulted by [`init_from_env`].
pub const ENV_VAR: &str = "POLAR_LOG";

/// Severity of a log message.
///
/// Ordered from most severe (`Error`) to least severe (`Trace`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Critical failures
    Error = 1,
    /// Potentially harmful situations
    Warn = 2,
    /// Informational messages
    Info = 3,
    /// Diagnostic detail such as slab growth
    Debug = 4,
    /// Per-operation tracing
    Trace = 5,
}

impl Level {
    /// Returns the ANSI color code for this level.
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case name of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match LevelFilter::from_str(s)? {
            LevelFilter::Off => Err(FilterError::InvalidLevel(s.to_string())),
            LevelFilter::Error => Ok(Level::Error),
            LevelFilter::Warn => Ok(Level::Warn),
            LevelFilter::Info => Ok(Level::Info),
            LevelFilter::Debug => Ok(Level::Debug),
            LevelFilter::Trace => Ok(Level::Trace),
        }
    }
}

/// Most verbose level a directive lets through, or `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LevelFilter {
    /// Nothing is logged
    Off = 0,
    /// Errors only
    Error = 1,
    /// Warnings and errors
    Warn = 2,
    /// Info and above
    Info = 3,
    /// Debug and above
    Debug = 4,
    /// Everything
    Trace = 5,
}

impl LevelFilter {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Returns true if messages at `level` pass this filter.
    #[must_use]
    pub const fn allows(self, level: Level) -> bool {
        level as u8 <= self as u8
    }
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> Self {
        LevelFilter::from_u8(level as u8)
    }
}

impl FromStr for LevelFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LevelFilter::Off),
            "error" => Ok(LevelFilter::Error),
            "warn" | "warning" => Ok(LevelFilter::Warn),
            "info" => Ok(LevelFilter::Info),
            "debug" => Ok(LevelFilter::Debug),
            "trace" => Ok(LevelFilter::Trace),
            _ => Err(FilterError::InvalidLevel(s.to_string())),
        }
    }
}

/// Error produced when a filter string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// A level name was not recognized.
    InvalidLevel(String),
    /// A `target=level` directive had an empty target.
    EmptyTarget(String),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::InvalidLevel(s) => write!(f, "Invalid log level: {s:?}"),
            FilterError::EmptyTarget(s) => {
                write!(f, "Directive {s:?} has an empty target")
            }
        }
    }
}

impl std::error::Error for FilterError {}

/// One `target=level` (or bare `level`) entry of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Directive {
    target: Option<String>,
    filter: LevelFilter,
}

impl Directive {
    fn matches(&self, target: &str) -> bool {
        match &self.target {
            None => true,
            Some(prefix) => {
                target == prefix
                    || (target.starts_with(prefix.as_str())
                        && target[prefix.len()..].starts_with("::"))
            }
        }
    }
}

/// A parsed filter: a default level plus per-target overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    default: LevelFilter,
    directives: Vec<Directive>,
}

impl Filter {
    /// Creates a filter that applies `default` to every target.
    #[must_use]
    pub const fn new(default: LevelFilter) -> Self {
        Self {
            default,
            directives: Vec::new(),
        }
    }

    /// Returns the filter that applies to `target`.
    ///
    /// The directive with the longest matching target wins.
    #[must_use]
    pub fn filter_for(&self, target: &str) -> LevelFilter {
        self.directives
            .iter()
            .filter(|d| d.matches(target))
            .max_by_key(|d| d.target.as_ref().map_or(0, String::len))
            .map_or(self.default, |d| d.filter)
    }

    /// Most verbose filter over all directives.
    fn max_filter(&self) -> LevelFilter {
        self.directives
            .iter()
            .map(|d| d.filter)
            .fold(self.default, LevelFilter::max)
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    /// Parses a comma separated list such as `polar_adt=trace,warn`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut filter = Filter::new(LevelFilter::Warn);

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some((target, level)) => {
                    let target = target.trim();
                    if target.is_empty() {
                        return Err(FilterError::EmptyTarget(part.to_string()));
                    }
                    filter.directives.push(Directive {
                        target: Some(target.to_string()),
                        filter: level.parse()?,
                    });
                }
                None => filter.default = part.parse()?,
            }
        }

        Ok(filter)
    }
}

/// The global logger.
///
/// `max` caches the most verbose level any directive allows so disabled
/// call sites cost one relaxed atomic load.
pub struct Logger {
    max: AtomicU8,
    filter: RwLock<Filter>,
}

impl Logger {
    fn new(filter: Filter) -> Self {
        Logger {
            max: AtomicU8::new(filter.max_filter() as u8),
            filter: RwLock::new(filter),
        }
    }

    /// Replaces the active filter.
    pub fn set_filter(&self, filter: Filter) {
        let max = filter.max_filter();
        let mut guard = self
            .filter
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = filter;
        self.max.store(max as u8, Ordering::Release);
    }

    /// Most verbose level enabled for any target.
    pub fn max_level(&self) -> LevelFilter {
        LevelFilter::from_u8(self.max.load(Ordering::Relaxed))
    }

    /// Checks if a message at `level` from `target` would be logged.
    pub fn enabled(&self, level: Level, target: &str) -> bool {
        if !self.max_level().allows(level) {
            return false;
        }
        self.filter
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .filter_for(target)
            .allows(level)
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, creating it with a `warn` default on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Filter::new(LevelFilter::Warn)))
}

/// Sets a single level for every target.
pub fn set_level(level: LevelFilter) {
    get_logger().set_filter(Filter::new(level));
}

/// Parses and installs a filter string.
///
/// # Errors
///
/// Returns a [`FilterError`] if a directive is malformed; the previous
/// filter stays active in that case.
pub fn set_filter(directives: &str) -> Result<(), FilterError> {
    let filter = directives.parse()?;
    get_logger().set_filter(filter);
    Ok(())
}

/// Installs the filter named by the `POLAR_LOG` environment variable.
///
/// An unset variable leaves the current filter in place.
///
/// # Errors
///
/// Returns a [`FilterError`] if the variable holds a malformed filter.
pub fn init_from_env() -> Result<(), FilterError> {
    match std::env::var(ENV_VAR) {
        Ok(directives) => set_filter(&directives),
        Err(_) => Ok(()),
    }
}

/// Checks if a message at `level` from `target` would be logged.
pub fn enabled(level: Level, target: &str) -> bool {
    get_logger().enabled(level, target)
}

/// Writes one record to stderr. Called by the macros after filtering.
#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    static RESET: &str = "\x1b[0m";

    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    // A failed write to stderr has nowhere to be reported.
    let _ = if stderr.is_terminal() {
        let color = level.color_code();
        writeln!(out, "{color}[{level}]{RESET} {target}: {args}")
    } else {
        writeln!(out, "[{level}] {target}: {args}")
    };
}

/// Logs a message at the given level, tagged with the caller's module path.
///
/// ```
/// use polar_log::{log, Level};
///
/// log!(level: Level::Info, "slab size is {}", 4096);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            let level = $level;
            if $crate::enabled(level, module_path!()) {
                $crate::__log_with_target(
                    level,
                    module_path!(),
                    format_args!($($arg)*)
                );
            }
        }
    };
}

/// Logs a message at the Error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs a message at the Warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs a message at the Info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs a message at the Debug level.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs a message at the Trace level.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}
