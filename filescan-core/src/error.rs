//! src/error.rs
//! ============================================================================
//! # Errors: scan failures and library-level errors
//!
//! Two kinds of failure exist in this crate:
//!
//! * [`ScanError`] is a *record*. It is produced by a running scan whenever a
//!   directory cannot be listed and is delivered on the scan's error stream.
//!   It never aborts the scan.
//! * [`AppError`] covers everything around the scan itself: configuration,
//!   input validation and a scan task that died before reporting.

use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// A directory that could not be listed during a scan.
#[derive(Debug, Error)]
#[error("Failed to read directory {path:?}: {cause}")]
pub struct ScanError {
    /// The directory whose listing failed.
    pub path: PathBuf,

    /// Underlying I/O failure.
    #[source]
    pub cause: io::Error,
}

impl ScanError {
    pub fn new<P: Into<PathBuf>>(path: P, cause: io::Error) -> Self {
        Self {
            path: path.into(),
            cause,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        self.cause.kind()
    }

    /// True when the directory did not exist at the time it was listed.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == io::ErrorKind::NotFound
    }
}

// io::Error is not Clone; keep kind and message.
impl Clone for ScanError {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            cause: io::Error::new(self.cause.kind(), self.cause.to_string()),
        }
    }
}

/// Library-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Standard IO error, auto-converted from `io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// TOML config serialization error.
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Config file I/O error with path.
    #[error("Failed to access config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Input validation errors
    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    /// The background scan task ended without producing a summary.
    #[error("Scan task failed: {reason}")]
    TaskFailed { reason: String },
}

impl AppError {
    /// Create an input validation error
    pub fn invalid_input<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a task failure error
    pub fn task_failed<S: Into<String>>(reason: S) -> Self {
        Self::TaskFailed {
            reason: reason.into(),
        }
    }

    pub fn config_io<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        Self::ConfigIo {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::task_failed(e.to_string())
    }
}
