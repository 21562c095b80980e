//! Branch fork engine.
//!
//! A fork is a full materialized copy: the new branch starts with one commit
//! holding a fresh `files` row for every file in the base branch's resolved
//! snapshot. After that the two branches share nothing, so appends to either
//! side are invisible to the other.
//!
//! # Atomicity
//!
//! Every step runs in one `BEGIN IMMEDIATE` transaction. The write lock is
//! held from the first read, so no append to the base branch can land
//! between resolving its snapshot and copying it, and a failure at any step
//! leaves no branch, commit or file behind.
//!
//! ```text
//! fork_branch(repo, "main", "feature", bob)
//!   ├── locate repo, base branch, creator
//!   ├── resolve_latest(main)                 ← snapshot at main's head H
//!   ├── INSERT branch feature (parent = main, forked_from = H)
//!   ├── append "Branch created from main"    ← copies every file row
//!   ├── feature.base_commit_id = that commit
//!   └── bob becomes a Contributor (as the commit's author)
//! ```

use forgehub_db::Store;
use rusqlite::params;
use tracing::instrument;

use crate::branches::{branch_by_id_tx, branch_by_name_tx};
use crate::commit_log::{CommitPayload, append_commit_tx};
use crate::error::CoreError;
use crate::model::ordering::now_micros;
use crate::model::{Branch, BranchId, BranchName, RepoId, UserId};
use crate::repos::repo_by_id_tx;
use crate::snapshot::resolve_latest_tx;
use crate::users::user_by_id_tx;

/// Message of the first commit on a forked branch.
#[must_use]
pub fn fork_message(base: &BranchName) -> String {
    format!("Branch created from {base}")
}

/// Create `name` in `repo` as a copy of `base`'s current snapshot.
#[instrument(skip_all, fields(repo_id = %repo, base = %base, branch = %name, creator_id = %creator))]
pub fn fork_branch(
    store: &mut Store,
    repo: RepoId,
    base: &BranchName,
    name: &BranchName,
    creator: UserId,
) -> Result<Branch, CoreError> {
    let (branch, copied) = store.write(|tx| {
        let repository = repo_by_id_tx(tx, repo)?;
        let base_branch = branch_by_name_tx(tx, &repository, base).map_err(|e| match e {
            CoreError::BranchNotFound { repo, branch } => CoreError::BaseBranchNotFound { repo, branch },
            other => other,
        })?;
        let creator = user_by_id_tx(tx, creator)?;

        let taken: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM branches WHERE repo_id = ?1 AND name = ?2)",
            params![repo, name],
            |row| row.get(0),
        )?;
        if taken {
            return Err(CoreError::DuplicateBranchName {
                repo: repository.full_name(),
                branch: name.to_string(),
            });
        }

        let snapshot = resolve_latest_tx(tx, &base_branch)?;

        tx.execute(
            "INSERT INTO branches (repo_id, name, parent_branch_id, forked_from_commit_id, creator_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![repo, name, base_branch.id, base_branch.last_commit_id, creator.id, now_micros()],
        )?;
        let branch_id = BranchId(tx.last_insert_rowid());

        let first = append_commit_tx(
            tx,
            repo,
            branch_id,
            &creator,
            &fork_message(base),
            CommitPayload::CopyOf(&snapshot),
        )?;
        tx.execute(
            "UPDATE branches SET base_commit_id = ?2 WHERE id = ?1",
            params![branch_id, first.id],
        )?;

        Ok((branch_by_id_tx(tx, branch_id)?, snapshot.len()))
    })?;
    tracing::info!(branch_id = %branch.id, files = copied, "branch forked");
    Ok(branch)
}
