use std::fmt;

/// Severity of a dispatcher diagnostic. `Fault` marks conditions the
/// dispatcher survives but a deployment should notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Fault,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Fault => write!(f, "fault"),
        }
    }
}

/// Message sink injected into the dispatcher at build time. Diagnostics
/// only: nothing in the crate bases a decision on what a sink does with a
/// message.
pub trait DispatchLog: Send + Sync {
    fn log(&self, level: LogLevel, message: fmt::Arguments<'_>);
}

/// Default sink, forwarding to the `log` facade so messages end up wherever
/// the host application routes them. Level filtering is then the backend's.
pub struct FacadeLog;

impl DispatchLog for FacadeLog {
    fn log(&self, level: LogLevel, message: fmt::Arguments<'_>) {
        match level {
            LogLevel::Debug => log::debug!("{message}"),
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Fault => log::error!("{message}"),
        }
    }
}

/// Self-contained sink writing everything at or above `min_level` to stderr.
pub struct StderrLog {
    min_level: LogLevel,
}

impl StderrLog {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }
}

impl DispatchLog for StderrLog {
    fn log(&self, level: LogLevel, message: fmt::Arguments<'_>) {
        if level >= self.min_level {
            eprintln!("[{level}] {message}");
        }
    }
}
