//! Error types for the invoice merge library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the invoice merge library
#[derive(Error, Debug)]
pub enum Error {
    /// Input file missing, not a valid PDF, or encrypted
    #[error("Unreadable input {}: {reason}", .path.display())]
    UnreadableInput {
        /// Path of the offending input
        path: PathBuf,
        /// What went wrong opening or parsing it
        reason: String,
    },

    /// A page's form/annotation content could not be rendered
    #[error("Failed to flatten {}{}: {reason}", .path.display(), .page.map(|p| format!(" (page {})", p)).unwrap_or_default())]
    FlattenFailure {
        /// Path of the input whose page failed
        path: PathBuf,
        /// 1-based page number, if the failure is page-specific
        page: Option<u32>,
        /// What went wrong
        reason: String,
    },

    /// No pages across all inputs
    #[error("Nothing to merge: inputs contain no pages")]
    EmptyMerge,

    /// Output path exists and overwrite not permitted
    #[error("Output already exists: {} (pass --overwrite to replace)", .0.display())]
    OutputConflict(PathBuf),

    /// Disk full, permission denied, or rename failure during finalization
    #[error("Failed to write {}: {source}", .path.display())]
    WriteFailure {
        /// Destination the merge was finalizing
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },

    /// Invalid glob pattern
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// No files matched pattern
    #[error("No PDF files found matching pattern: {0}")]
    NoFilesMatched(String),
}

impl Error {
    /// Process exit code for this failure kind.
    ///
    /// The CLI exits with a distinct code per kind so callers (scripts,
    /// the packaging pipeline) can tell failures apart without parsing
    /// stderr.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::UnreadableInput { .. } => 2,
            Error::FlattenFailure { .. } => 3,
            Error::EmptyMerge => 4,
            Error::OutputConflict(_) => 5,
            Error::WriteFailure { .. } => 6,
            Error::InvalidGlob(_) | Error::NoFilesMatched(_) => 1,
        }
    }
}
