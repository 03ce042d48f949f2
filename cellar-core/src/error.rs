/*!
Error types for the Cellar core engine.
*/

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the Cellar core.
pub type Result<T> = std::result::Result<T, CellarError>;

/// Errors that can occur during backup and restore operations.
#[derive(Error, Debug)]
pub enum CellarError {
    /// A referenced path does not exist
    #[error("Not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A registration target escapes the archive root
    #[error("Path {} is not contained in root {}", path.display(), root.display())]
    PathNotContained { path: PathBuf, root: PathBuf },

    /// The archive could not be written
    #[error("Archive creation failed: {0}")]
    ArchiveCreationFailed(String),

    /// The archive could not be read or unpacked
    #[error("Archive extraction failed: {0}")]
    ArchiveExtractionFailed(String),

    /// A row value could not be normalized or encoded
    #[error("Serialization failed for table '{table}': {reason}")]
    SerializationFailed { table: String, reason: String },

    /// Connectivity, query or statement errors from the database collaborator
    #[error("Database error: {0}")]
    DatabaseFailed(String),

    /// One table's insert batch failed and was rolled back
    #[error("Restore of table '{table}' failed at row {row} and was rolled back: {reason}")]
    RestoreBatchFailed {
        table: String,
        row: usize,
        reason: String,
    },

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record file content does not match its recorded hash
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Record file written by an incompatible or unknown format
    #[error("Invalid record file format: {0}")]
    InvalidFormat(String),

    /// Configuration validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl CellarError {
    /// Create a new not-found error
    pub fn not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a new archive creation error
    pub fn archive_creation<S: Into<String>>(msg: S) -> Self {
        Self::ArchiveCreationFailed(msg.into())
    }

    /// Create a new archive extraction error
    pub fn archive_extraction<S: Into<String>>(msg: S) -> Self {
        Self::ArchiveExtractionFailed(msg.into())
    }

    /// Create a new serialization error for a table
    pub fn serialization<T: Into<String>, S: Into<String>>(table: T, reason: S) -> Self {
        Self::SerializationFailed {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Create a new database error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseFailed(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Short, stable name of the error kind for user-facing reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::PathNotContained { .. } => "PathNotContained",
            Self::ArchiveCreationFailed(_) => "ArchiveCreationFailed",
            Self::ArchiveExtractionFailed(_) => "ArchiveExtractionFailed",
            Self::SerializationFailed { .. } => "SerializationFailed",
            Self::DatabaseFailed(_) => "DatabaseFailed",
            Self::RestoreBatchFailed { .. } => "RestoreBatchFailed",
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
            Self::IntegrityCheckFailed { .. } => "IntegrityCheckFailed",
            Self::InvalidFormat(_) => "InvalidFormat",
            Self::Validation(_) => "Validation",
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for CellarError {
    fn from(err: rusqlite::Error) -> Self {
        Self::DatabaseFailed(err.to_string())
    }
}
