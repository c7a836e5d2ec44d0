//! Shared plumbing for the wasteland command line tools: log setup and
//! exit-code handling.

use std::fmt::Display;
use std::process;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

pub const EXIT_USAGE: i32 = 1;
pub const EXIT_FAILURE: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Silence everything.
    Panic,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Panic => LevelFilter::Off,
        }
    }
}

/// Route `log` records to stderr, timestamped, at `level` and above.
pub fn init_logging(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:<5} {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
}

/// Exit code for a failed argument parse. Help and version requests are
/// not failures.
pub fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        EXIT_USAGE
    } else {
        0
    }
}

/// Parse the process arguments, exiting with [`EXIT_USAGE`] on bad usage.
pub fn parse_args<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = usage_exit_code(&err);
            let _ = err.print();
            process::exit(code);
        }
    }
}

/// Install the logger, reporting a failure as an operational error.
pub fn setup(level: LogLevel) {
    if let Err(e) = init_logging(level.into()) {
        on_err(e);
    }
}

pub fn on_err(err: impl Display) -> ! {
    eprintln!("* error: {}", err);
    process::exit(EXIT_FAILURE);
}

/// Unwrap `result` or exit with [`EXIT_FAILURE`].
pub fn or_exit<T, E: Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|e| on_err(e))
}
