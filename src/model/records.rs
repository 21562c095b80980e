//! Plain row structs returned by the data-access functions.
//!
//! None of these hold a connection or lazily load relations: every field a
//! caller needs is resolved by the query that built the struct.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::ordering::CommitOrder;
use crate::model::types::{
    BranchId, BranchName, CommitId, FileId, FileName, IssueId, IssueStatus, PullRequestId,
    PullRequestStatus, RepoId, RepoName, Role, UserId, Username, Visibility,
};

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A repository, addressed by `owner/name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub id: RepoId,
    pub owner_id: UserId,
    pub owner: Username,
    pub name: RepoName,
    pub description: String,
    pub visibility: Visibility,
    pub default_branch_id: Option<BranchId>,
    pub created_at: DateTime<Utc>,
}

impl Repository {
    /// `owner/name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// A branch row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub id: BranchId,
    pub repo_id: RepoId,
    pub name: BranchName,
    /// Branch this one was forked from; `None` for a repository's root branch.
    pub parent_branch_id: Option<BranchId>,
    /// The branch's own first commit, holding the materialized fork copy.
    /// Written once at creation.
    pub base_commit_id: Option<CommitId>,
    /// The parent's head at the moment of the fork.
    pub forked_from_commit_id: Option<CommitId>,
    /// Head pointer; only ever advances.
    pub last_commit_id: CommitId,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Immutable commit metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub id: CommitId,
    pub branch_id: BranchId,
    pub author_id: UserId,
    pub author: Username,
    pub message: String,
    #[serde(skip)]
    pub timestamp_us: i64,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// Position of this commit in its branch's total order.
    #[must_use]
    pub const fn order(&self) -> CommitOrder {
        CommitOrder::new(self.timestamp_us, self.id)
    }
}

/// A commit with the number of file versions it introduced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    #[serde(flatten)]
    pub commit: CommitInfo,
    pub file_count: u64,
}

/// A commit together with the file versions it introduced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitDetail {
    #[serde(flatten)]
    pub commit: CommitInfo,
    pub files: Vec<FileRef>,
}

/// A reference to one stored file version, without its bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileRef {
    pub file_id: FileId,
    pub file_name: FileName,
    pub size: u64,
    pub commit: CommitInfo,
}

/// A file version with its content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileContent {
    #[serde(flatten)]
    pub file: FileRef,
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// The resolved `file name -> latest version` mapping of a branch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub branch_id: Option<BranchId>,
    /// Commit the view was resolved at: the branch head, or the cursor given
    /// to [`resolve_as_of`](crate::snapshot::resolve_as_of).
    pub as_of: Option<CommitId>,
    pub files: BTreeMap<FileName, FileRef>,
}

impl Snapshot {
    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the snapshot holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Latest version of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FileRef> {
        self.files.get(name)
    }

    /// File names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(FileName::as_str)
    }

    /// File ids in name order.
    pub fn file_ids(&self) -> impl Iterator<Item = FileId> {
        self.files.values().map(|f| f.file_id)
    }
}

/// A branch with the display fields collaborators need.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BranchSummary {
    #[serde(flatten)]
    pub branch: Branch,
    pub creator: Username,
    pub parent: Option<BranchName>,
    pub last_commit: CommitInfo,
}

/// A (repository, user) membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Contributor {
    pub repo_id: RepoId,
    pub user_id: UserId,
    pub username: Username,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A pull request row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    pub id: PullRequestId,
    pub repo_id: RepoId,
    pub creator_id: UserId,
    pub base_branch_id: BranchId,
    pub target_branch_id: BranchId,
    pub title: String,
    pub description: String,
    pub status: PullRequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Listing projection of a pull request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PullRequestSummary {
    #[serde(flatten)]
    pub pull_request: PullRequest,
    pub creator: Username,
    pub base_branch: BranchName,
    pub target_branch: BranchName,
}

/// One reviewer's current review of a pull request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Review {
    pub pr_id: PullRequestId,
    pub reviewer_id: UserId,
    pub reviewer: Username,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An issue ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub id: IssueId,
    pub repo_id: RepoId,
    pub creator_id: UserId,
    pub assignee_id: Option<UserId>,
    pub title: String,
    pub description: String,
    pub status: IssueStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
