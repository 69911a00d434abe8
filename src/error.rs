//! Fatal errors of the checker.
//!
//! Errors of the *checked* program are not represented here: they are data,
//! recorded on a [`Trace`][crate::trace::Trace] as [`TraceError`][crate::trace::TraceError]s.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::MemoryModel;

/// Result type for checker operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unrecoverable conditions that abort a whole exploration.
#[derive(Debug, Error)]
pub enum Error {
    /// The program file could not be read.
    #[error("Failed to read assembly file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The program text is not valid assembly.
    #[error("Failed to parse assembly at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The program parsed, but refers to things that do not exist.
    #[error("Invalid module: {message}")]
    Check { message: String },

    /// No engine implements the requested memory model.
    #[error("Unsupported memory model: {0}")]
    UnsupportedMemoryModel(MemoryModel),

    /// The module has no entry function.
    #[error("No {0} function found in module")]
    MissingEntryPoint(String),

    /// The execution engine could not be constructed.
    #[error("Error creating execution engine: {message}")]
    EngineCreation { message: String },

    /// [`init`][crate::init] was not called before using the checker.
    #[error("Checker runtime is not initialized; call smc_rs::init() first")]
    NotInitialized,
}

impl Error {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn check(message: impl Into<String>) -> Self {
        Error::Check {
            message: message.into(),
        }
    }

    /// Whether the error was raised while loading the program text.
    pub fn is_load_error(&self) -> bool {
        matches!(self, Error::Io { .. } | Error::Parse { .. } | Error::Check { .. })
    }
}
