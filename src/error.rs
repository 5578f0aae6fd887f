//! Error types for smelter.
//!
//! Column-level lookup failures are not errors: they resolve to a SQL `NULL`
//! inside the extraction engine and never reach this type.

use std::path::PathBuf;

use crate::adapter::ParseError;

/// Error type for schema loading, parsing and ingestion.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The schema violates an invariant. Reported before any file is opened.
    #[error("invalid schema: {0}")]
    Config(String),

    /// A source file could not be turned into a document tree, even with recovery.
    #[error("malformed input in {}: {source}", path.display())]
    MalformedInput {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// The destination rejected a statement. Fatal for the run.
    #[error("sink rejected statement: {0}")]
    Sink(String),

    /// Reading a schema file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Prefix a configuration error with where it was found.
    pub(crate) fn in_context(self, context: impl std::fmt::Display) -> Self {
        match self {
            Error::Config(message) => Error::Config(format!("{context}: {message}")),
            other => other,
        }
    }
}

/// Result type alias for smelter operations.
pub type Result<T> = std::result::Result<T, Error>;
