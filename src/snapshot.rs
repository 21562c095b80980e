//! Snapshot resolution: the current file set of a branch.
//!
//! A branch's tree is never stored; it is derived from history. For each
//! file name the version written by the greatest commit under the
//! `(commit_ts, commit id)` order wins, with file id breaking ties inside a
//! single commit. Rows are read in ascending order and folded into a
//! `BTreeMap`, so a later version simply overwrites an earlier one and the
//! result is the same for every call that sees the same rows.
//!
//! Every public function runs inside a read transaction: a concurrent append
//! is observed with all of its files or not at all.

use forgehub_db::Store;
use rusqlite::{Connection, OptionalExtension, params};

use crate::branches::locate_branch_tx;
use crate::commit_log::{COMMIT_COLUMNS, commit_from_row, commit_on_branch_tx};
use crate::error::CoreError;
use crate::model::{Branch, BranchName, CommitId, CommitInfo, CommitOrder, FileContent, FileName, FileRef, RepoId, Snapshot};

const FILE_REF_SELECT: &str = "SELECT f.id, f.file_name, f.size";

fn file_ref_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRef> {
    Ok(FileRef {
        file_id: row.get(0)?,
        file_name: row.get(1)?,
        size: row.get(2)?,
        commit: commit_from_row(row, 3)?,
    })
}

/// Fold the branch's file rows up to and including `cursor` into a snapshot.
fn resolve_tx(conn: &Connection, branch: &Branch, cursor: CommitOrder) -> Result<Snapshot, CoreError> {
    let mut stmt = conn.prepare_cached(&format!(
        "{FILE_REF_SELECT}, {COMMIT_COLUMNS}
         FROM files f
         JOIN commits c ON c.id = f.commit_id
         JOIN users u ON u.id = c.author_id
         WHERE c.branch_id = ?1
           AND (c.commit_ts < ?2 OR (c.commit_ts = ?2 AND c.id <= ?3))
         ORDER BY c.commit_ts, c.id, f.id"
    ))?;
    let rows = stmt.query_map(
        params![branch.id, cursor.timestamp_us, cursor.commit_id],
        file_ref_from_row,
    )?;

    let mut snapshot = Snapshot {
        branch_id: Some(branch.id),
        as_of: Some(cursor.commit_id),
        ..Snapshot::default()
    };
    for file in rows {
        let file = file?;
        snapshot.files.insert(file.file_name.clone(), file);
    }
    tracing::debug!(branch = %branch.name, as_of = %cursor, files = snapshot.len(), "snapshot resolved");
    Ok(snapshot)
}

/// Resolve the latest snapshot of `branch` inside an open transaction.
pub(crate) fn resolve_latest_tx(conn: &Connection, branch: &Branch) -> Result<Snapshot, CoreError> {
    let head = commit_on_branch_tx(conn, branch, branch.last_commit_id)?;
    resolve_tx(conn, branch, head.order())
}

/// The latest version of every file on `branch`.
pub fn resolve_latest(store: &mut Store, repo: RepoId, branch: &BranchName) -> Result<Snapshot, CoreError> {
    store.read(|tx| {
        let (_, branch) = locate_branch_tx(tx, repo, branch)?;
        resolve_latest_tx(tx, &branch)
    })
}

/// The snapshot of `branch` as it was right after `commit`.
pub fn resolve_as_of(
    store: &mut Store,
    repo: RepoId,
    branch: &BranchName,
    commit: CommitId,
) -> Result<Snapshot, CoreError> {
    store.read(|tx| {
        let (_, branch) = locate_branch_tx(tx, repo, branch)?;
        let cursor = commit_on_branch_tx(tx, &branch, commit)?;
        resolve_tx(tx, &branch, cursor.order())
    })
}

fn version_at_tx(
    conn: &Connection,
    branch: &Branch,
    commit: CommitId,
    file_name: &FileName,
) -> Result<Option<FileRef>, CoreError> {
    Ok(conn
        .query_row(
            &format!(
                "{FILE_REF_SELECT}, {COMMIT_COLUMNS}
                 FROM files f
                 JOIN commits c ON c.id = f.commit_id
                 JOIN users u ON u.id = c.author_id
                 WHERE f.commit_id = ?1 AND f.file_name = ?2 AND c.branch_id = ?3
                 ORDER BY f.id DESC
                 LIMIT 1"
            ),
            params![commit, file_name, branch.id],
            file_ref_from_row,
        )
        .optional()?)
}

/// The version of `file_name` written by exactly `commit` on `branch`.
///
/// `VersionNotFound` when that commit did not write the file, including when
/// the commit belongs to another branch.
pub fn resolve_at_commit(
    store: &mut Store,
    repo: RepoId,
    branch: &BranchName,
    commit: CommitId,
    file_name: &FileName,
) -> Result<FileRef, CoreError> {
    store.read(|tx| {
        let (_, branch) = locate_branch_tx(tx, repo, branch)?;
        version_at_tx(tx, &branch, commit, file_name)?.ok_or_else(|| CoreError::VersionNotFound {
            branch: branch.name.to_string(),
            commit,
            file_name: file_name.to_string(),
        })
    })
}

/// Commits on `branch` that wrote `file_name`, newest first.
pub fn resolve_history(
    store: &mut Store,
    repo: RepoId,
    branch: &BranchName,
    file_name: &FileName,
) -> Result<Vec<CommitInfo>, CoreError> {
    store.read(|tx| {
        let (_, branch) = locate_branch_tx(tx, repo, branch)?;
        let mut stmt = tx.prepare(&format!(
            "SELECT {COMMIT_COLUMNS}
             FROM commits c JOIN users u ON u.id = c.author_id
             WHERE c.branch_id = ?1
               AND EXISTS (SELECT 1 FROM files f WHERE f.commit_id = c.id AND f.file_name = ?2)
             ORDER BY c.commit_ts DESC, c.id DESC"
        ))?;
        let rows = stmt.query_map(params![branch.id, file_name], |row| commit_from_row(row, 0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Content of `file_name` on `branch`, at the head or at an explicit commit.
///
/// The bytes are returned exactly as stored.
pub fn read_file(
    store: &mut Store,
    repo: RepoId,
    branch: &BranchName,
    file_name: &FileName,
    at: Option<CommitId>,
) -> Result<FileContent, CoreError> {
    store.read(|tx| {
        let (_, branch) = locate_branch_tx(tx, repo, branch)?;
        let file = match at {
            Some(commit) => version_at_tx(tx, &branch, commit, file_name)?.ok_or_else(|| {
                CoreError::VersionNotFound {
                    branch: branch.name.to_string(),
                    commit,
                    file_name: file_name.to_string(),
                }
            })?,
            None => resolve_latest_tx(tx, &branch)?
                .files
                .remove(file_name)
                .ok_or_else(|| CoreError::FileNotFound {
                    branch: branch.name.to_string(),
                    file_name: file_name.to_string(),
                })?,
        };
        let content: Vec<u8> = tx.query_row("SELECT content FROM files WHERE id = ?1", [file.file_id], |row| {
            row.get(0)
        })?;
        Ok(FileContent { file, content })
    })
}
