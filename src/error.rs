// ABOUTME: Error taxonomy for the sync pipeline
// ABOUTME: Distinguishes retryable extract failures from fatal data errors

use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Source query or object-storage read/write failed. Retryable per the
    /// scheduler policy.
    #[error("Extract failed: {0}")]
    Extract(String),

    /// Expected columns are missing from an input. Fatal; needs a human.
    #[error("Schema mismatch in {context}: missing columns {missing:?}")]
    SchemaMismatch {
        context: String,
        missing: Vec<String>,
    },

    /// The source snapshot contained zero rows. Fatal-soft: downstream
    /// mutation is aborted rather than treated as "nothing changed".
    #[error("Source snapshot is empty - refusing to reconcile against an empty extract")]
    EmptyExtract,

    /// A value cannot be safely serialized into a SQL literal.
    #[error("Render failed: {0}")]
    Render(String),

    /// Warehouse connection or statement failure outside the partial-apply
    /// window. Retryable.
    #[error("Warehouse error: {0}")]
    Warehouse(String),

    /// The insert step failed after the close-out update already ran. The
    /// warehouse is in an inconsistent intermediate state; operators must
    /// resolve it before the insert is attempted again.
    #[error("Partial apply: update step committed but insert failed: {0}")]
    PartialApply(String),

    /// Run-state file error.
    #[error("State file error: {0}")]
    State(String),

    /// Configuration error (invalid TOML, missing fields, bad URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_postgres::Error> for SyncError {
    fn from(err: tokio_postgres::Error) -> Self {
        SyncError::Warehouse(err.to_string())
    }
}

impl SyncError {
    /// Create a SchemaMismatch error for the given input boundary.
    pub fn schema_mismatch(context: impl Into<String>, missing: Vec<String>) -> Self {
        SyncError::SchemaMismatch {
            context: context.into(),
            missing,
        }
    }

    /// Whether the scheduler may retry the run after this error.
    ///
    /// Only transient infrastructure failures qualify. Data-shape errors
    /// and the partial-apply window must surface to an operator instead.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Extract(_) | SyncError::Warehouse(_) | SyncError::Io(_)
        )
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, SyncError>;
