use crate::model::{DocId, Kind};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an operation. Per-record problems never surface here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing {kind} dump file: {path}")]
    MissingPrerequisiteFile { kind: Kind, path: PathBuf },

    #[error("unsupported kind: {0}")]
    UnsupportedKind(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Xml(e.to_string())
    }
}

/// Failures reported by a document sink.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// Negative or placeholder id. Expected in dumps and skipped without logging.
    #[error("invalid document id {0}")]
    InvalidId(DocId),

    #[error("index {0} does not exist")]
    MissingIndex(String),

    #[error("{0}")]
    Backend(String),
}

impl From<sled::Error> for SinkError {
    fn from(e: sled::Error) -> Self {
        SinkError::Backend(e.to_string())
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        SinkError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError::Backend(e.to_string())
    }
}
