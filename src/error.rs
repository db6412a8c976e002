use std::path::PathBuf;

use thiserror::Error;

/// Every failure mode the reader can surface, each tagged with the BGEN file
/// it was operating on so a caller juggling several open readers can tell
/// them apart from the error alone.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{path}: I/O error: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: malformed BGEN data: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("{path}: header mismatch: {message}")]
    HeaderMismatch { path: PathBuf, message: String },

    #[error("{path}: unsupported: {message}")]
    Unsupported { path: PathBuf, message: String },

    #[error("{path}: operation requires a .bgi index, but none is open")]
    IndexMissing { path: PathBuf },

    #[error("{path}: .bgi index does not describe this BGEN file: {message}")]
    IndexMismatch { path: PathBuf, message: String },

    #[error("{path}: selector must be a contiguous range or a list of integer indices")]
    SelectorType { path: PathBuf },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn header_mismatch(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::HeaderMismatch {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Unsupported {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn index_mismatch(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::IndexMismatch {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
