use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::utils::hash::{self, StringHash};

// ----------------------------------------------
// Level
// ----------------------------------------------

// Ordered by severity; the global filter keeps everything at or above.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Silent,
    Verbose,
    Info,
    Warn,
    Error,
}

impl Level {
    #[inline]
    pub fn is_enabled(self) -> bool {
        (self as u32) >= LEVEL_FILTER.load(Ordering::Relaxed)
    }

    fn label(self) -> &'static str {
        match self {
            Self::Silent  => "Silent",
            Self::Verbose => "Verbose",
            Self::Info    => "Info",
            Self::Warn    => "Warn",
            Self::Error   => "Error",
        }
    }

    fn color_code(self) -> &'static str {
        match self {
            Self::Silent  => "",
            Self::Verbose => "\x1b[90m", // gray
            Self::Info    => "\x1b[32m", // green
            Self::Warn    => "\x1b[33m", // yellow
            Self::Error   => "\x1b[31m", // red
        }
    }
}

// ----------------------------------------------
// Channel
// ----------------------------------------------

// Named message category with a pre-hashed tag, e.g. "grid", "pool".
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: &'static str,
    pub hash: StringHash,
}

impl Channel {
    #[inline]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            hash: hash::fnv1a_from_str(name),
        }
    }
}

impl Hash for Channel {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

#[macro_export]
macro_rules! channel {
    ($name:literal) => { $crate::log::Channel::new($name) };
}

// ----------------------------------------------
// Hook
// ----------------------------------------------

// One borrowed view of an emitted message, passed to the optional hook.
pub struct Entry<'a> {
    pub level: Level,
    pub channel: Option<Channel>,
    pub message: &'a str,
}

static HOOK: OnceLock<Box<dyn Fn(&Entry) + Send + Sync>> = OnceLock::new();

// Installs a hook that observes every emitted message, e.g. to mirror
// diagnostics into a UI console. Can only be set once.
pub fn set_hook<F>(hook_fn: F)
    where F: Fn(&Entry) + Send + Sync + 'static
{
    if HOOK.set(Box::new(hook_fn)).is_err() {
        panic!("Log hook can only be set once!");
    }
}

// ----------------------------------------------
// Global Configs
// ----------------------------------------------

static LEVEL_FILTER: AtomicU32 = AtomicU32::new(Level::Verbose as u32);
static SHOW_SOURCE:  AtomicBool = AtomicBool::new(false);
static USE_COLORS:   AtomicBool = AtomicBool::new(true);

pub fn set_level(level: Level) {
    LEVEL_FILTER.store(level as u32, Ordering::Relaxed);
}

pub fn show_source_location(show: bool) {
    SHOW_SOURCE.store(show, Ordering::Relaxed);
}

pub fn use_tty_colors(use_colors: bool) {
    USE_COLORS.store(use_colors, Ordering::Relaxed);
}

// ----------------------------------------------
// Emission
// ----------------------------------------------

// Called by the logging macros; not meant to be used directly.
pub fn emit(level: Level,
            channel: Option<Channel>,
            file: &'static str,
            line: u32,
            args: fmt::Arguments) {
    if !level.is_enabled() {
        return;
    }

    let message = args.to_string();

    if let Some(hook) = HOOK.get() {
        hook(&Entry { level, channel, message: &message });
    }

    let (color, reset) = {
        if USE_COLORS.load(Ordering::Relaxed) {
            (level.color_code(), "\x1b[0m")
        } else {
            ("", "")
        }
    };

    let mut tag = String::new();
    tag.push('[');
    tag.push_str(level.label());
    tag.push(']');

    if let Some(chan) = channel {
        tag.push_str(" [");
        tag.push_str(chan.name);
        tag.push(']');
    }

    // Write errors are ignored; there is no better place to report them.
    let mut out = std::io::stderr().lock();
    let _ = {
        if SHOW_SOURCE.load(Ordering::Relaxed) {
            writeln!(&mut out, "{color}{tag}{reset} {file}:{line} - {message}")
        } else {
            writeln!(&mut out, "{color}{tag}{reset} {message}")
        }
    };
}

// Shared helper used by all logging macros.
#[macro_export]
macro_rules! log_at {
    ($level:expr, $chan:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        if $level.is_enabled() {
            $crate::log::emit(
                $level,
                $chan,
                file!(),
                line!(),
                format_args!($fmt $(, $($arg)+)?)
            );
        }
    };
}

// ----------------------------------------------
// Public API
// ----------------------------------------------

// Verbose
#[macro_export]
macro_rules! verbose {
    ($fmt:literal $(, $($arg:tt)+)?) => {
        $crate::log_at!($crate::log::Level::Verbose, None, $fmt $(, $($arg)+)?)
    };
    ($chan:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        $crate::log_at!($crate::log::Level::Verbose, Some($chan), $fmt $(, $($arg)+)?)
    };
}

// Info
#[macro_export]
macro_rules! info {
    ($fmt:literal $(, $($arg:tt)+)?) => {
        $crate::log_at!($crate::log::Level::Info, None, $fmt $(, $($arg)+)?)
    };
    ($chan:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        $crate::log_at!($crate::log::Level::Info, Some($chan), $fmt $(, $($arg)+)?)
    };
}

// Warn
#[macro_export]
macro_rules! warn {
    ($fmt:literal $(, $($arg:tt)+)?) => {
        $crate::log_at!($crate::log::Level::Warn, None, $fmt $(, $($arg)+)?)
    };
    ($chan:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        $crate::log_at!($crate::log::Level::Warn, Some($chan), $fmt $(, $($arg)+)?)
    };
}

// Error
#[macro_export]
macro_rules! error {
    ($fmt:literal $(, $($arg:tt)+)?) => {
        $crate::log_at!($crate::log::Level::Error, None, $fmt $(, $($arg)+)?)
    };
    ($chan:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        $crate::log_at!($crate::log::Level::Error, Some($chan), $fmt $(, $($arg)+)?)
    };
}

// Re-export these here so usage is scoped, e.g., log::info!(), log::warn!(), etc.
#[allow(unused_imports)]
pub use crate::{channel, verbose, info, warn, error};
