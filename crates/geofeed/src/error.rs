//! Error types for geofeed.
//!
//! This module defines all error types used throughout the geofeed crate,
//! grouped by the layer that raises them.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for geofeed operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Engagement Errors ===
    /// The record store did not complete a write.
    #[error("write of report '{report_id}' failed: {message}")]
    WriteFailure {
        /// Report that was being written.
        report_id: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A conditional write kept losing against concurrent writers.
    #[error("report '{report_id}' changed concurrently; gave up after {attempts} attempts")]
    VersionConflict {
        /// Report that was being written.
        report_id: String,
        /// Number of write attempts made.
        attempts: u32,
    },

    /// The report does not exist in the store.
    #[error("report '{report_id}' not found")]
    ReportNotFound {
        /// Identifier that was looked up.
        report_id: String,
    },

    /// A report violates a data-model invariant.
    #[error("invalid report '{report_id}': {message}")]
    InvalidReport {
        /// Offending report.
        report_id: String,
        /// The violated invariant.
        message: String,
    },

    /// A star value outside `[0, 5]` or not a number.
    #[error("star value {value} is outside 0..=5")]
    InvalidStarValue {
        /// The rejected value.
        value: f64,
    },

    /// An operation was invoked with inputs it does not accept.
    #[error("precondition violated: {message}")]
    PreconditionViolation {
        /// Which precondition failed.
        message: String,
    },

    /// No user identity is available.
    #[error("no user is signed in")]
    NotAuthenticated,

    // === Share Errors ===
    /// The platform share facility failed (dismissal is not a failure).
    #[error("share failed: {message}")]
    ShareFailure {
        /// Description reported by the share facility.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for geofeed operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new write failure for a report.
    #[must_use]
    pub fn write_failure(report_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteFailure {
            report_id: report_id.into(),
            message: message.into(),
        }
    }

    /// Create an invalid report error.
    #[must_use]
    pub fn invalid_report(report_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReport {
            report_id: report_id.into(),
            message: message.into(),
        }
    }

    /// Create a report-not-found error.
    #[must_use]
    pub fn report_not_found(report_id: impl Into<String>) -> Self {
        Self::ReportNotFound {
            report_id: report_id.into(),
        }
    }

    /// Create a precondition violation.
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolation {
            message: message.into(),
        }
    }

    /// Create a share failure.
    #[must_use]
    pub fn share_failure(message: impl Into<String>) -> Self {
        Self::ShareFailure {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is a failed store write.
    #[must_use]
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::WriteFailure { .. })
    }

    /// Check if this error is a lost compare-and-swap race.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Check if re-invoking the operation with a fresh report may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WriteFailure { .. }
                | Self::VersionConflict { .. }
                | Self::DatabaseQuery(_)
                | Self::Io(_)
        )
    }
}
