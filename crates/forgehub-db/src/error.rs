//! Error types for storage operations.
//!
//! [`DbError`] is the single error type returned by [`Store`](crate::Store)
//! and by every closure run inside one of its transactions. SQLite failures
//! are classified on the way in so callers can match on lock contention and
//! constraint violations without inspecting result codes.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors returned by storage operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The database file could not be opened or configured.
    #[error("could not open database at {}: {message}", path.display())]
    Open {
        /// Path that was being opened (`:memory:` for in-memory stores).
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The write lock could not be acquired before the busy timeout expired,
    /// or a snapshot was invalidated by a concurrent writer.
    ///
    /// The whole operation is safe to re-issue.
    #[error("database is busy: {0}")]
    Busy(#[source] rusqlite::Error),

    /// A UNIQUE or PRIMARY KEY constraint rejected the write.
    #[error("unique constraint violated: {message}")]
    UniqueViolation {
        /// SQLite's description, e.g. `UNIQUE constraint failed: branches.repo_id, branches.name`.
        message: String,
    },

    /// A FOREIGN KEY constraint rejected the write.
    #[error("foreign key constraint violated: {message}")]
    ForeignKeyViolation {
        /// SQLite's description of the failed constraint.
        message: String,
    },

    /// The on-disk schema could not be brought to the current version.
    #[error("schema migration from v{from} failed: {message}")]
    Migration {
        /// Version found on disk.
        from: i64,
        /// Why the migration failed.
        message: String,
    },

    /// Any other SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),
}

impl DbError {
    /// Returns `true` if re-issuing the whole operation may succeed.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    /// Returns `true` for UNIQUE / PRIMARY KEY violations.
    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// The constraint text for a UNIQUE violation, if this is one.
    #[must_use]
    pub fn unique_violation_detail(&self) -> Option<&str> {
        match self {
            Self::UniqueViolation { message } => Some(message),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        let rusqlite::Error::SqliteFailure(ffi_err, message) = &err else {
            return Self::Sqlite(err);
        };
        match ffi_err.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Self::Busy(err),
            ErrorCode::ConstraintViolation => {
                let message = message.clone().unwrap_or_else(|| ffi_err.to_string());
                match ffi_err.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        Self::UniqueViolation { message }
                    }
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                        Self::ForeignKeyViolation { message }
                    }
                    _ => Self::Sqlite(err),
                }
            }
            _ => Self::Sqlite(err),
        }
    }
}
