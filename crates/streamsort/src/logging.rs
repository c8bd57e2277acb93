//! Diagnostics for streamsort.
//!
//! Diagnostics go through `tracing`; what the user is meant to read goes
//! through [`crate::interaction::Interaction`] instead. Log lines go to
//! stderr unless `logging.file` is configured, which keeps them off the
//! shell prompt.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// How much streamsort logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only (`-q`).
    Quiet,
    /// Info and above.
    #[default]
    Normal,
    /// Debug and above (`-v`).
    Verbose,
    /// Everything, including each Spotify request (`-vv`).
    Trace,
}

impl Verbosity {
    /// From the command line's `-q` flag and `-v` count.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Filter used when `RUST_LOG` is unset. Other crates stay silent.
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Quiet => "streamsort=error",
            Self::Normal => "streamsort=info",
            Self::Verbose => "streamsort=debug",
            Self::Trace => "streamsort=trace",
        }
    }
}

/// Open `path` for appending, creating it and its directory if needed.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn subscriber(filter: EnvFilter, file: Option<File>) -> impl Subscriber + Send + Sync {
    let (to_file, to_stderr) = match file {
        Some(file) => (
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false)),
            None,
        ),
        None => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(to_file)
        .with(to_stderr)
}

/// Install the global subscriber. `RUST_LOG` overrides `verbosity`.
///
/// Does nothing if a subscriber is already installed.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init_logging(verbosity: Verbosity, file: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    let file = file.map(open_log_file).transpose()?;
    let _ = subscriber(filter, file).try_init();
    Ok(())
}

/// Warnings and errors only, captured per test.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
