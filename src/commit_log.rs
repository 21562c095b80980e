//! Commit log: the append-only history of each branch.
//!
//! An append inserts one `commits` row, one `files` row per file and then
//! moves the branch head, all inside one `BEGIN IMMEDIATE` transaction.
//! Appends to the same branch therefore run one after another, and a commit
//! is visible to readers with all of its files or not at all.
//!
//! # Ordering
//!
//! Commits on a branch are totally ordered by `(commit_ts, id)`. The
//! timestamp is clamped to the current head's so a wall clock stepping
//! backwards cannot place a new commit before the head, and ids come from
//! `AUTOINCREMENT` so they only grow. Every append is therefore strictly
//! later than the head it replaces.

use std::collections::HashSet;

use forgehub_db::Store;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::instrument;

use crate::branches::locate_branch_tx;
use crate::contributors::ensure_contributor_tx;
use crate::error::CoreError;
use crate::model::ordering::{clamp_timestamp, from_micros, now_micros};
use crate::model::{
    Branch, BranchId, BranchName, CommitDetail, CommitId, CommitInfo, CommitSummary, FileName,
    FileRef, RepoId, Role, Snapshot, User, UserId,
};
use crate::users::user_by_id_tx;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One file version to store in a new commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFile {
    pub name: FileName,
    pub content: Vec<u8>,
    /// Size reported by the uploader; must equal `content.len()` when set.
    pub declared_size: Option<u64>,
}

impl NewFile {
    /// A file whose size is taken from its content.
    #[must_use]
    pub const fn new(name: FileName, content: Vec<u8>) -> Self {
        Self {
            name,
            content,
            declared_size: None,
        }
    }

    /// Record the size the uploader claimed.
    #[must_use]
    pub const fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    fn size(&self) -> u64 {
        u64::try_from(self.content.len()).unwrap_or(u64::MAX)
    }
}

/// Where the files of a new commit come from.
pub(crate) enum CommitPayload<'a> {
    /// Caller-supplied bytes.
    Upload(&'a [NewFile]),
    /// Byte-for-byte copies of the versions in a resolved snapshot.
    CopyOf(&'a Snapshot),
}

fn validate_message(message: &str) -> Result<(), CoreError> {
    if message.trim().is_empty() {
        return Err(CoreError::invalid("message", "must not be empty"));
    }
    Ok(())
}

fn validate_files(files: &[NewFile]) -> Result<(), CoreError> {
    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
        if !seen.insert(file.name.as_str()) {
            return Err(CoreError::invalid(
                "files",
                format!("'{}' appears more than once in one commit", file.name),
            ));
        }
        if let Some(declared) = file.declared_size
            && declared != file.size()
        {
            return Err(CoreError::invalid(
                "size",
                format!(
                    "'{}' declared {declared} bytes but has {}",
                    file.name,
                    file.size()
                ),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping shared with the resolver and branch queries
// ---------------------------------------------------------------------------

/// Columns read by [`commit_from_row`]; expects `commits c JOIN users u ON u.id = c.author_id`.
pub(crate) const COMMIT_COLUMNS: &str = "c.id, c.branch_id, c.author_id, u.username, c.message, c.commit_ts";

/// Number of columns in [`COMMIT_COLUMNS`].
pub(crate) const COMMIT_COLUMN_COUNT: usize = 6;

pub(crate) fn commit_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<CommitInfo> {
    let timestamp_us: i64 = row.get(start + 5)?;
    Ok(CommitInfo {
        id: row.get(start)?,
        branch_id: row.get(start + 1)?,
        author_id: row.get(start + 2)?,
        author: row.get(start + 3)?,
        message: row.get(start + 4)?,
        timestamp_us,
        timestamp: from_micros(timestamp_us),
    })
}

/// `commit` if it belongs to `branch`, else `CommitNotFound`.
pub(crate) fn commit_on_branch_tx(
    conn: &Connection,
    branch: &Branch,
    commit: CommitId,
) -> Result<CommitInfo, CoreError> {
    conn.query_row(
        &format!(
            "SELECT {COMMIT_COLUMNS} FROM commits c JOIN users u ON u.id = c.author_id
             WHERE c.id = ?1 AND c.branch_id = ?2"
        ),
        params![commit, branch.id],
        |row| commit_from_row(row, 0),
    )
    .optional()?
    .ok_or_else(|| CoreError::CommitNotFound {
        branch: branch.name.to_string(),
        commit,
    })
}

// ---------------------------------------------------------------------------
// Append
// ---------------------------------------------------------------------------

/// Append a commit to `branch_id` inside an open write transaction.
///
/// Reads the head under the caller's write lock, so the clamped timestamp
/// and the pointer update cannot race another append. Also records the
/// author as a Contributor of `repo_id`.
pub(crate) fn append_commit_tx(
    conn: &Connection,
    repo_id: RepoId,
    branch_id: BranchId,
    author: &User,
    message: &str,
    payload: CommitPayload<'_>,
) -> Result<CommitInfo, CoreError> {
    validate_message(message)?;
    if let CommitPayload::Upload(files) = &payload {
        validate_files(files)?;
    }

    let head_ts: Option<i64> = conn
        .query_row(
            "SELECT c.commit_ts FROM branches b LEFT JOIN commits c ON c.id = b.last_commit_id
             WHERE b.id = ?1 AND b.repo_id = ?2",
            params![branch_id, repo_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| CoreError::BranchNotFound {
            repo: format!("#{repo_id}"),
            branch: format!("#{branch_id}"),
        })?;

    let timestamp_us = clamp_timestamp(now_micros(), head_ts);
    conn.execute(
        "INSERT INTO commits (branch_id, author_id, message, commit_ts) VALUES (?1, ?2, ?3, ?4)",
        params![branch_id, author.id, message, timestamp_us],
    )?;
    let commit_id = CommitId(conn.last_insert_rowid());

    let file_count = match payload {
        CommitPayload::Upload(files) => {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO files (commit_id, file_name, content, size) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for file in files {
                let size = i64::try_from(file.size())
                    .map_err(|_| CoreError::invalid("size", format!("'{}' is too large", file.name)))?;
                stmt.execute(params![commit_id, file.name, file.content, size])?;
            }
            files.len()
        }
        CommitPayload::CopyOf(snapshot) => {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO files (commit_id, file_name, content, size)
                 SELECT ?1, file_name, content, size FROM files WHERE id = ?2",
            )?;
            for file_id in snapshot.file_ids() {
                stmt.execute(params![commit_id, file_id])?;
            }
            snapshot.len()
        }
    };

    conn.execute(
        "UPDATE branches SET last_commit_id = ?2 WHERE id = ?1",
        params![branch_id, commit_id],
    )?;
    ensure_contributor_tx(conn, repo_id, author.id, Role::Contributor)?;

    tracing::debug!(commit_id = %commit_id, files = file_count, "commit appended");
    Ok(CommitInfo {
        id: commit_id,
        branch_id,
        author_id: author.id,
        author: author.username.clone(),
        message: message.to_owned(),
        timestamp_us,
        timestamp: from_micros(timestamp_us),
    })
}

/// Append a commit with `files` to `branch` and advance its head.
///
/// Zero files is allowed. The author becomes a Contributor of the
/// repository if they are not one already.
#[instrument(skip_all, fields(repo_id = %repo, branch = %branch, author_id = %author))]
pub fn append_commit(
    store: &mut Store,
    repo: RepoId,
    branch: &BranchName,
    author: UserId,
    message: &str,
    files: &[NewFile],
) -> Result<CommitInfo, CoreError> {
    let commit = store.write(|tx| {
        let (_, branch) = locate_branch_tx(tx, repo, branch)?;
        let author = user_by_id_tx(tx, author)?;
        append_commit_tx(tx, repo, branch.id, &author, message, CommitPayload::Upload(files))
    })?;
    tracing::info!(commit_id = %commit.id, files = files.len(), "commit created");
    Ok(commit)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Commits of `branch`, newest first, with file counts.
pub fn list_commits(
    store: &mut Store,
    repo: RepoId,
    branch: &BranchName,
    limit: Option<usize>,
) -> Result<Vec<CommitSummary>, CoreError> {
    let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
    store.read(|tx| {
        let (_, branch) = locate_branch_tx(tx, repo, branch)?;
        let mut stmt = tx.prepare(&format!(
            "SELECT {COMMIT_COLUMNS}, (SELECT count(*) FROM files f WHERE f.commit_id = c.id)
             FROM commits c JOIN users u ON u.id = c.author_id
             WHERE c.branch_id = ?1
             ORDER BY c.commit_ts DESC, c.id DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![branch.id, limit], |row| {
            Ok(CommitSummary {
                commit: commit_from_row(row, 0)?,
                file_count: row.get(COMMIT_COLUMN_COUNT)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// One commit of `branch` with the file versions it introduced.
pub fn get_commit(
    store: &mut Store,
    repo: RepoId,
    branch: &BranchName,
    commit: CommitId,
) -> Result<CommitDetail, CoreError> {
    store.read(|tx| {
        let (_, branch) = locate_branch_tx(tx, repo, branch)?;
        let info = commit_on_branch_tx(tx, &branch, commit)?;
        let mut stmt = tx.prepare(
            "SELECT id, file_name, size FROM files WHERE commit_id = ?1 ORDER BY file_name, id",
        )?;
        let files = stmt
            .query_map([commit], |row| {
                Ok(FileRef {
                    file_id: row.get(0)?,
                    file_name: row.get(1)?,
                    size: row.get(2)?,
                    commit: info.clone(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CommitDetail { commit: info, files })
    })
}
