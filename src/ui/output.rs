//! ui::output
//!
//! Logging setup and plain output.
//!
//! # Design
//!
//! Progress and failures are reported through `tracing`, to stderr and
//! optionally to a log file. Command results meant for scripts (the
//! `resolve` listing) go straight to stdout and ignore [`Verbosity`].

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Warnings and errors only
    Quiet,
    /// Progress per recipe
    Normal,
    /// Git and recipe engine details
    Debug,
    /// Every subprocess invocation
    Trace,
}

impl Verbosity {
    /// Combine the command-line flags with the configured level.
    ///
    /// `-v` flags win over the config value; `--quiet` wins over both.
    pub fn from_flags(quiet: bool, verbose: u8, configured: u8) -> Self {
        if quiet {
            return Verbosity::Quiet;
        }
        match verbose.max(configured) {
            0 => Verbosity::Normal,
            1 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }

    /// Default filter directive when `RUST_LOG` is unset.
    pub fn directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Debug => "debug",
            Verbosity::Trace => "trace",
        }
    }

    /// Level passed down to the recipe engine (`-v` count).
    pub fn engine_level(self) -> u8 {
        match self {
            Verbosity::Quiet | Verbosity::Normal => 0,
            Verbosity::Debug => 1,
            Verbosity::Trace => 2,
        }
    }
}

/// Errors setting up logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("logging already initialised: {0}")]
    Init(String),
}

/// Install the global subscriber: stderr plus an optional plain-text file.
///
/// `RUST_LOG` overrides the verbosity-derived filter.
pub fn init_logging(verbosity: Verbosity, log_file: Option<&Path>) -> Result<(), LoggingError> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.directive()))
    };

    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| LoggingError::LogFile {
                    path: path.display().to_string(),
                    source: e,
                })?;
            }
            let f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LoggingError::LogFile {
                    path: path.display().to_string(),
                    source: e,
                })?;
            Some(
                fmt::layer()
                    .with_writer(Arc::new(f))
                    .with_ansi(false)
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins() {
        assert_eq!(Verbosity::from_flags(true, 3, 2), Verbosity::Quiet);
    }

    #[test]
    fn flags_and_config_combine() {
        assert_eq!(Verbosity::from_flags(false, 0, 0), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(false, 1, 0), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, 0, 1), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, 2, 0), Verbosity::Trace);
        assert_eq!(Verbosity::from_flags(false, 0, 5), Verbosity::Trace);
    }

    #[test]
    fn directives() {
        assert_eq!(Verbosity::Quiet.directive(), "warn");
        assert_eq!(Verbosity::Normal.directive(), "info");
        assert_eq!(Verbosity::Debug.directive(), "debug");
        assert_eq!(Verbosity::Trace.directive(), "trace");
    }

    #[test]
    fn engine_level() {
        assert_eq!(Verbosity::Normal.engine_level(), 0);
        assert_eq!(Verbosity::Trace.engine_level(), 2);
    }

    #[test]
    fn unwritable_log_file_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        // A directory cannot be opened for appending
        let err = init_logging(Verbosity::Normal, Some(temp.path())).unwrap_err();
        assert!(matches!(err, LoggingError::LogFile { .. }));
    }
}
