use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for the CodePager library.
///
/// These are run-level errors: they are returned to the caller and abort the
/// operation that produced them. Failures of a single analysis unit are never
/// reported through this type; see [`UnitError`].
///
/// # Examples
///
/// ```
/// use codepager::Error;
///
/// let error = Error::Configuration("max_parallel must be positive".to_string());
/// assert!(matches!(error, Error::Configuration(_)));
///
/// let error = Error::InvalidContext("truncated token".to_string());
/// assert!(error.is_caller_error());
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid tunables, detected before any work starts
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Input the library refuses to coerce (e.g. null content)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Continuation token belongs to another run or strategy
    #[error("Context mismatch: {0}")]
    ContextMismatch(String),

    /// Continuation token is malformed, corrupted or of an unknown version
    #[error("Invalid context: {0}")]
    InvalidContext(String),

    /// The run was cancelled before every unit completed
    #[error("Run cancelled after {completed} completed units")]
    Cancelled { completed: usize },

    /// Run id is unknown or has expired
    #[error("Unknown run: {0}")]
    UnknownRun(String),

    /// Requested export format has no renderer
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Renderer failed to produce output
    #[error("Export error: {0}")]
    Export(String),

    /// Tree-sitter error for tree-sitter specific failures
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    /// Directory not found error
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),
}

impl Error {
    /// Whether the error was caused by the caller's request rather than by the
    /// system. Protocol layers use this to pick an error code.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::InvalidInput(_)
                | Error::ContextMismatch(_)
                | Error::InvalidContext(_)
                | Error::UnknownRun(_)
                | Error::UnsupportedFormat(_)
                | Error::DirectoryNotFound(_)
        )
    }
}

/// Result type alias for CodePager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single analysis unit.
///
/// A `UnitError` is recorded inside the unit's [`UnitResult`](crate::UnitResult)
/// and never aborts the run.
///
/// # Examples
///
/// ```
/// use codepager::UnitError;
///
/// let err = UnitError::Timeout(250);
/// assert_eq!(err.to_string(), "analysis timed out after 250 ms");
/// assert!(err.is_timeout());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnitError {
    /// The analyzer reported a failure
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// The analyzer did not finish within the per-unit timeout (milliseconds)
    #[error("analysis timed out after {0} ms")]
    Timeout(u64),

    /// The analyzer panicked
    #[error("analysis panicked: {0}")]
    Panicked(String),

    /// The analyzer returned something that cannot be paged
    #[error("invalid analysis output: {0}")]
    InvalidOutput(String),

    /// Reading the unit's data failed
    #[error("io error: {0}")]
    Io(String),

    /// The unit was deliberately not analyzed
    #[error("skipped: {0}")]
    Skipped(String),
}

impl UnitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, UnitError::Timeout(_))
    }
}

impl From<io::Error> for UnitError {
    fn from(err: io::Error) -> Self {
        UnitError::Io(err.to_string())
    }
}
