//! Per-sample error taxonomy
//!
//! Everything that can go wrong while one sample moves through the pipeline.
//! Recoverable conditions are logged and skipped at the stage that raised
//! them; the rest terminate the worker that hit them.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for per-sample operations
pub type SampleResult<T> = std::result::Result<T, SampleError>;

/// Errors raised while loading, processing or persisting one sample
#[derive(Debug, Error)]
pub enum SampleError {
    /// Image or data file could not be read or decoded
    #[error("Loading {path} failed: {reason}")]
    FileLoading { path: PathBuf, reason: String },

    /// A file the sample layout requires is not present
    #[error("Missing sample file {0}")]
    MissingFile(PathBuf),

    /// Sample directory is not a directory (or has vanished)
    #[error("Not a sample directory: {0}")]
    NotADirectory(PathBuf),

    /// Barcode decoder could not process an image
    #[error("Barcode decoding failed: {0}")]
    Barcode(String),

    /// OCR engine failed hard (timeouts are not errors)
    #[error("OCR failed: {0}")]
    Ocr(String),

    /// Rename refused or failed on disk
    #[error("Renaming {from} to {to} failed: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Metadata record could not be (de)serialized
    #[error("Metadata record error for {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Tabular output could not be written
    #[error("Table output error: {0}")]
    Table(#[from] csv::Error),

    /// Any other I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SampleError {
    pub fn file_loading(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileLoading {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error is an anticipated per-sample condition.
    ///
    /// Anticipated errors are logged and the pipeline moves on. Anything
    /// else is treated as a bug or an environment fault and is allowed to
    /// take the worker down.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SampleError::FileLoading { .. }
            | SampleError::MissingFile(_)
            | SampleError::NotADirectory(_)
            | SampleError::Barcode(_)
            | SampleError::Ocr(_)
            | SampleError::Metadata { .. } => true,
            // A failed rename leaves the sample where it was
            SampleError::Rename { .. } => true,
            SampleError::Io(err) => is_known_io_kind(err.kind()),
            SampleError::Table(err) => err.is_io_error(),
        }
    }
}

fn is_known_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::AlreadyExists
    )
}
