/*!
Error taxonomy shared by every state component
*/

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Machine-readable error category, preserved for callers and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Privilege,
    Io,
    Decode,
    Entropy,
}

#[derive(Debug, Error)]
pub enum StateError {
    /// The process lacks administrative/root rights
    #[error("administrator privileges are required")]
    Privilege,
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("audit store error: {0}")]
    Store(#[from] rusqlite::Error),
    /// The config file exists but is not a JSON object
    #[error("malformed config at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The OS entropy source could not be read
    #[error("secure random source unavailable: {0}")]
    Entropy(#[from] rand::Error),
    #[error("state store at {path} is locked by another process")]
    Busy { path: PathBuf },
}

impl StateError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StateError::Privilege => ErrorKind::Privilege,
            StateError::Io { .. } | StateError::Store(_) | StateError::Busy { .. } => ErrorKind::Io,
            StateError::Decode { .. } => ErrorKind::Decode,
            StateError::Entropy(_) => ErrorKind::Entropy,
        }
    }
}

pub type StateResult<T> = Result<T, StateError>;
