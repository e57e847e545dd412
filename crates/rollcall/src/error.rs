//! Error taxonomy shared by the pipeline stages.
//!
//! Each error carries enough context to be logged and counted at the
//! stage boundary that catches it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A document could not be rendered or read. The document is skipped.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to render {document}: {message}")]
    Render { document: String, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("page cache for {document} is unusable: {message}")]
    Cache { document: String, message: String },
}

/// The AI Gateway gave up on a call after its retries.
#[derive(Debug, Error)]
#[error("{kind} call for {context} failed after {attempts} attempt(s): {message}")]
pub struct ExternalServiceError {
    /// `classify` or `extract`.
    pub kind: &'static str,
    /// Page or batch the call was made for.
    pub context: String,
    pub attempts: u32,
    pub message: String,
}

/// The reference store could not answer a query.
#[derive(Debug, Error)]
pub enum ReferenceLookupError {
    #[error("reference store unavailable: {0}")]
    Unavailable(String),

    #[error("reference query failed: {0}")]
    Query(String),

    #[error("reference data is malformed: {0}")]
    Malformed(String),
}

/// Memory stayed above the limit for the whole pause window.
#[derive(Debug, Error)]
#[error("memory use {used_percent:.1}% above {limit_percent:.1}% for {waited:?}; intake stopped")]
pub struct MemoryPressureError {
    pub used_percent: f32,
    pub limit_percent: f32,
    pub waited: Duration,
}

/// Why a page ended in the failed state.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("preprocessing failed: {0}")]
    Preprocess(String),

    #[error(transparent)]
    External(#[from] ExternalServiceError),

    #[error(transparent)]
    Reference(#[from] ReferenceLookupError),

    #[error("job timed out before the page finished")]
    Timeout,

    #[error("worker stopped unexpectedly: {0}")]
    Worker(String),
}
