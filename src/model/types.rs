//! Core identifier and name types for forgehub.
//!
//! Row identifiers are thin newtypes over the SQLite rowid so a `CommitId`
//! can never be passed where a `BranchId` is expected. Names that come from
//! outside (usernames, repository, branch and file names) are validated once
//! at construction and carried as [`Username`], [`RepoName`], [`BranchName`]
//! and [`FileName`] afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Row identifiers
// ---------------------------------------------------------------------------

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// The raw rowid.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl rusqlite::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                rusqlite::ToSql::to_sql(&self.0)
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
                <i64 as rusqlite::types::FromSql>::column_result(value).map(Self)
            }
        }
    };
}

row_id!(
    /// Identifier of a user row.
    UserId
);
row_id!(
    /// Identifier of a repository row.
    RepoId
);
row_id!(
    /// Identifier of a branch row.
    BranchId
);
row_id!(
    /// Identifier of a commit row. Strictly increasing in insertion order.
    CommitId
);
row_id!(
    /// Identifier of one stored file version.
    FileId
);
row_id!(
    /// Identifier of a pull request.
    PullRequestId
);
row_id!(
    /// Identifier of an issue.
    IssueId
);

// ---------------------------------------------------------------------------
// Validated names
// ---------------------------------------------------------------------------

macro_rules! validated_name {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $validate:path) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap `s`.
            ///
            /// # Errors
            /// Returns a [`ValidationError`] describing the first rule `s` breaks.
            pub fn new(s: &str) -> Result<Self, ValidationError> {
                $validate(s).map_err(|reason| ValidationError {
                    kind: $kind,
                    value: s.to_owned(),
                    reason,
                })?;
                Ok(Self(s.to_owned()))
            }

            /// The name as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(&s)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> Self {
                name.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl rusqlite::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.0.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
                Self::new(value.as_str()?)
                    .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

validated_name!(
    /// A login name: 1–39 ASCII alphanumerics or hyphens, not starting or
    /// ending with a hyphen.
    Username,
    ValidationKind::Username,
    validate_username
);
validated_name!(
    /// A repository name, unique per owner: 1–100 characters from
    /// `[A-Za-z0-9._-]`, not `.` or `..`.
    RepoName,
    ValidationKind::RepoName,
    validate_repo_name
);
validated_name!(
    /// A branch name, unique per repository. Slash-separated segments of
    /// `[A-Za-z0-9._-]`; no empty segment, no `..`, at most 200 characters.
    BranchName,
    ValidationKind::BranchName,
    validate_branch_name
);
validated_name!(
    /// The declared name of a stored file. Opaque to the store apart from
    /// these rules: non-empty, at most 1024 bytes, no NUL, no leading or
    /// trailing whitespace.
    FileName,
    ValidationKind::FileName,
    validate_file_name
);

impl Username {
    /// The maximum length of a username.
    pub const MAX_LEN: usize = 39;
}

impl RepoName {
    /// The maximum length of a repository name.
    pub const MAX_LEN: usize = 100;
}

impl BranchName {
    /// The maximum length of a branch name.
    pub const MAX_LEN: usize = 200;
}

impl FileName {
    /// The maximum length of a file name in bytes.
    pub const MAX_LEN: usize = 1024;
}

fn check_length(s: &str, max: usize) -> Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_owned());
    }
    if s.len() > max {
        return Err(format!("must be at most {max} characters, got {}", s.len()));
    }
    Ok(())
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn validate_username(s: &str) -> Result<(), String> {
    check_length(s, Username::MAX_LEN)?;
    if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err("must contain only ASCII letters, digits and hyphens".to_owned());
    }
    if s.starts_with('-') || s.ends_with('-') {
        return Err("must not start or end with a hyphen".to_owned());
    }
    Ok(())
}

fn validate_repo_name(s: &str) -> Result<(), String> {
    check_length(s, RepoName::MAX_LEN)?;
    if !s.chars().all(is_name_char) {
        return Err("must contain only ASCII letters, digits, '.', '_' and '-'".to_owned());
    }
    if s == "." || s == ".." {
        return Err("'.' and '..' are reserved".to_owned());
    }
    Ok(())
}

fn validate_branch_name(s: &str) -> Result<(), String> {
    check_length(s, BranchName::MAX_LEN)?;
    for segment in s.split('/') {
        if segment.is_empty() {
            return Err("must not contain empty path segments".to_owned());
        }
        if !segment.chars().all(is_name_char) {
            return Err("segments may contain only ASCII letters, digits, '.', '_' and '-'".to_owned());
        }
        if segment.starts_with('.') || segment.ends_with(".lock") {
            return Err("segments must not start with '.' or end with '.lock'".to_owned());
        }
    }
    if s.contains("..") {
        return Err("must not contain '..'".to_owned());
    }
    Ok(())
}

fn validate_file_name(s: &str) -> Result<(), String> {
    check_length(s, FileName::MAX_LEN)?;
    if s.contains('\0') {
        return Err("must not contain NUL bytes".to_owned());
    }
    if s.trim() != s {
        return Err("must not start or end with whitespace".to_owned());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Enumerations stored as text
// ---------------------------------------------------------------------------

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// The lowercase text stored in the database.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ValidationError {
                        kind: ValidationKind::$name,
                        value: s.to_owned(),
                        reason: format!("expected one of: {}", [$($text),+].join(", ")),
                    }),
                }
            }
        }

        impl rusqlite::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse()
                    .map_err(|e: ValidationError| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(
    /// A contributor's permission level within one repository.
    Role {
        /// May append commits, fork branches, open PRs and issues.
        Contributor => "contributor",
        /// Additionally may change repository settings and roles.
        Admin => "admin",
    }
);

text_enum!(
    /// Who can see a repository.
    Visibility {
        /// Listed and readable by everyone.
        Public => "public",
        /// Readable by contributors only (enforced by the caller layer).
        Private => "private",
    }
);

text_enum!(
    /// Lifecycle state of a pull request.
    PullRequestStatus {
        /// Awaiting review.
        Open => "open",
        /// Accepted.
        Merged => "merged",
        /// Rejected or withdrawn.
        Closed => "closed",
    }
);

text_enum!(
    /// Lifecycle state of an issue. `Open` and `Closed` are mutually reachable.
    IssueStatus {
        /// Work outstanding.
        Open => "open",
        /// Resolved; may be reopened.
        Closed => "closed",
    }
);

impl Default for Role {
    fn default() -> Self {
        Self::Contributor
    }
}

impl Role {
    /// Whether this role may change repository settings and roles.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl Visibility {
    /// Map the `is_private` column.
    #[must_use]
    pub const fn from_private_flag(is_private: bool) -> Self {
        if is_private { Self::Private } else { Self::Public }
    }

    /// Value for the `is_private` column.
    #[must_use]
    pub const fn is_private(self) -> bool {
        matches!(self, Self::Private)
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// What kind of value failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationKind {
    /// A [`Username`].
    Username,
    /// A [`RepoName`].
    RepoName,
    /// A [`BranchName`].
    BranchName,
    /// A [`FileName`].
    FileName,
    /// A [`Role`].
    Role,
    /// A [`Visibility`].
    Visibility,
    /// A [`PullRequestStatus`].
    PullRequestStatus,
    /// An [`IssueStatus`].
    IssueStatus,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Username => "username",
            Self::RepoName => "repository name",
            Self::BranchName => "branch name",
            Self::FileName => "file name",
            Self::Role => "role",
            Self::Visibility => "visibility",
            Self::PullRequestStatus => "pull request status",
            Self::IssueStatus => "issue status",
        };
        f.write_str(label)
    }
}

/// A value that failed one of the naming rules above.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ValidationKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
