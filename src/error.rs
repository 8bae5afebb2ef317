//! Error types for the extraction pipeline.
//!
//! Only [`RetrievalError`] and [`ProcessError`] ever cause a record to be
//! skipped. Model and extraction failures degrade to the regex path.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single model invocation.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("model call timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("model API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

impl InvokeError {
    /// Timeout and connection-class failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, InvokeError::Timeout | InvokeError::Connection(_))
    }
}

impl From<reqwest::Error> for InvokeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            InvokeError::Timeout
        } else if e.is_connect() || e.is_request() {
            InvokeError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            InvokeError::Api {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            InvokeError::InvalidResponse(e.to_string())
        }
    }
}

/// A stage-two model answer that cannot be used.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("model answer is not JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("model answer is a JSON {0}, expected an object")]
    NotObject(&'static str),

    #[error("model answer does not match schema: {0}")]
    Schema(#[source] serde_json::Error),
}

/// The remote document could not be fetched.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("share session registration failed: {0}")]
    Session(String),

    #[error("remote file not found: {0}")]
    NotFound(String),

    #[error("transfer of {path} failed: {source}")]
    Transfer {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while preparing a record's document for analysis.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("cannot create work directory {path:?}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read local copy {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Record source or result sink failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}
