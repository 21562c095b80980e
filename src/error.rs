//! Error types for forgehub core operations.
//!
//! Defines [`CoreError`], the unified error type returned by every operation
//! in this crate, and [`ErrorClass`], the coarse taxonomy external callers
//! branch on (map to HTTP status, decide whether to retry).
//!
//! Each variant carries the key that failed so a caller can render a useful
//! message without re-querying.

use std::fmt;

use forgehub_db::DbError;
use thiserror::Error;

use crate::model::types::{CommitId, IssueId, PullRequestId, ValidationError};

// ---------------------------------------------------------------------------
// ErrorClass
// ---------------------------------------------------------------------------

/// Coarse classification of a [`CoreError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A referenced repository, branch, commit, file, issue or PR is missing.
    NotFound,
    /// A uniqueness or referential rule would be broken.
    Conflict,
    /// The actor is not allowed to perform this action.
    Forbidden,
    /// Lost a race for the store's write lock; re-issue the whole operation.
    Retryable,
    /// A required field is missing or malformed.
    InvalidInput,
    /// The store failed in a way retrying will not fix.
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::Retryable => "retryable",
            Self::InvalidInput => "invalid-input",
            Self::Internal => "internal",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// CoreError
// ---------------------------------------------------------------------------

/// Unified error type for forgehub core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No user with this name or id.
    #[error("user '{user}' not found")]
    UserNotFound {
        /// Username or `#id`.
        user: String,
    },

    /// No repository at `owner/name` (or with this id).
    #[error("repository '{repo}' not found")]
    RepositoryNotFound {
        /// `owner/name` or `#id`.
        repo: String,
    },

    /// The branch does not exist in the repository.
    #[error("branch '{branch}' not found in '{repo}'")]
    BranchNotFound {
        /// `owner/name` of the repository searched.
        repo: String,
        /// Branch name (or `#id`).
        branch: String,
    },

    /// The branch named as a fork source does not exist.
    #[error("base branch '{branch}' not found in '{repo}'")]
    BaseBranchNotFound {
        /// `owner/name` of the repository searched.
        repo: String,
        /// Requested base branch name.
        branch: String,
    },

    /// The commit does not exist on this branch.
    #[error("commit {commit} not found on branch '{branch}'")]
    CommitNotFound {
        /// Branch searched.
        branch: String,
        /// Commit requested.
        commit: CommitId,
    },

    /// The commit did not write a version of this file.
    #[error("no version of '{file_name}' at commit {commit} on branch '{branch}'")]
    VersionNotFound {
        /// Branch searched.
        branch: String,
        /// Commit requested.
        commit: CommitId,
        /// File requested.
        file_name: String,
    },

    /// The file does not exist in the branch's current snapshot.
    #[error("file '{file_name}' not found on branch '{branch}'")]
    FileNotFound {
        /// Branch searched.
        branch: String,
        /// File requested.
        file_name: String,
    },

    /// No issue with this id.
    #[error("issue #{id} not found")]
    IssueNotFound {
        /// Issue requested.
        id: IssueId,
    },

    /// The user has no contributor row in the repository.
    #[error("'{user}' is not a contributor of '{repo}'")]
    ContributorNotFound {
        /// `owner/name`.
        repo: String,
        /// Username.
        user: String,
    },

    /// No pull request with this id.
    #[error("pull request #{id} not found")]
    PullRequestNotFound {
        /// Pull request requested.
        id: PullRequestId,
    },

    /// A user already holds this username or email.
    #[error("a user with {field} '{value}' already exists")]
    DuplicateUser {
        /// `"username"` or `"email"`.
        field: &'static str,
        /// The taken value.
        value: String,
    },

    /// The owner already has a repository with this name.
    #[error("repository '{repo}' already exists")]
    DuplicateRepository {
        /// `owner/name`.
        repo: String,
    },

    /// The repository already has a branch with this name.
    #[error("branch '{branch}' already exists in '{repo}'")]
    DuplicateBranchName {
        /// `owner/name`.
        repo: String,
        /// The taken branch name.
        branch: String,
    },

    /// The user is already a contributor.
    #[error("'{user}' is already a contributor of '{repo}'")]
    DuplicateContributor {
        /// `owner/name`.
        repo: String,
        /// Username.
        user: String,
    },

    /// The branch cannot be removed while something still refers to it.
    #[error("branch '{branch}' is in use: {reason}")]
    BranchInUse {
        /// Branch name.
        branch: String,
        /// What still refers to it.
        reason: String,
    },

    /// The owner's Admin role cannot be changed.
    #[error("the owner of '{repo}' must remain an admin")]
    OwnerRoleLocked {
        /// `owner/name`.
        repo: String,
    },

    /// The actor lacks permission for the action.
    #[error("forbidden: {actor} may not {action}: {reason}")]
    Forbidden {
        /// Username of the actor.
        actor: String,
        /// What was attempted, e.g. `"edit issue #4"`.
        action: String,
        /// Which rule denied it.
        reason: String,
    },

    /// A field failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A name failed validation.
    #[error(transparent)]
    InvalidName(#[from] ValidationError),

    /// The store was busy; the operation left no trace and may be re-issued.
    #[error("store busy, retry the operation: {0}")]
    Retryable(#[source] DbError),

    /// Non-retryable storage failure.
    #[error("storage failure: {0}")]
    Storage(#[source] DbError),
}

impl CoreError {
    /// The taxonomy bucket of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::UserNotFound { .. }
            | Self::RepositoryNotFound { .. }
            | Self::BranchNotFound { .. }
            | Self::BaseBranchNotFound { .. }
            | Self::CommitNotFound { .. }
            | Self::VersionNotFound { .. }
            | Self::FileNotFound { .. }
            | Self::IssueNotFound { .. }
            | Self::ContributorNotFound { .. }
            | Self::PullRequestNotFound { .. } => ErrorClass::NotFound,
            Self::DuplicateUser { .. }
            | Self::DuplicateRepository { .. }
            | Self::DuplicateBranchName { .. }
            | Self::DuplicateContributor { .. }
            | Self::BranchInUse { .. }
            | Self::OwnerRoleLocked { .. } => ErrorClass::Conflict,
            Self::Forbidden { .. } => ErrorClass::Forbidden,
            Self::InvalidInput { .. } | Self::InvalidName(_) => ErrorClass::InvalidInput,
            Self::Retryable(_) => ErrorClass::Retryable,
            Self::Storage(_) => ErrorClass::Internal,
        }
    }

    /// Shorthand for `self.class() == ErrorClass::Retryable`.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn forbidden(
        actor: impl fmt::Display,
        action: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Forbidden {
            actor: actor.to_string(),
            action: action.into(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        if err.is_busy() {
            Self::Retryable(err)
        } else {
            Self::Storage(err)
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        DbError::from(err).into()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::BranchName;

    fn busy() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_owned()),
        )
    }

    #[test]
    fn busy_store_is_retryable() {
        let err: CoreError = busy().into();
        assert!(err.is_retryable());
        assert_eq!(err.class(), ErrorClass::Retryable);
        assert!(err.to_string().contains("retry"));
    }

    #[test]
    fn other_store_errors_are_internal() {
        let err: CoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.class(), ErrorClass::Internal);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn not_found_variants_name_their_key() {
        let err = CoreError::VersionNotFound {
            branch: "main".to_owned(),
            commit: CommitId(12),
            file_name: "README.md".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("README.md"));
        assert!(msg.contains("12"));
        assert!(msg.contains("main"));
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn conflicts_and_forbidden_classify() {
        let dup = CoreError::DuplicateBranchName {
            repo: "alice/proj".to_owned(),
            branch: "feature".to_owned(),
        };
        assert_eq!(dup.class(), ErrorClass::Conflict);
        assert!(dup.to_string().contains("alice/proj"));

        let denied = CoreError::forbidden("mallory", "edit issue #3", "not creator or assignee");
        assert_eq!(denied.class(), ErrorClass::Forbidden);
        assert!(denied.to_string().contains("mallory"));
    }

    #[test]
    fn validation_errors_are_invalid_input() {
        let err: CoreError = BranchName::new("a b").unwrap_err().into();
        assert_eq!(err.class(), ErrorClass::InvalidInput);
        assert!(err.to_string().contains("branch name"));
    }

    #[test]
    fn class_display_is_kebab_case() {
        assert_eq!(ErrorClass::InvalidInput.to_string(), "invalid-input");
        assert_eq!(ErrorClass::NotFound.to_string(), "not-found");
    }
}
