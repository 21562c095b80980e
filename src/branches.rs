//! Branch queries and lifecycle.
//!
//! Branches are created by [`crate::repos::create_repository`] (the root
//! branch) and [`crate::fork::fork_branch`]; this module reads them back and
//! deletes them.

use forgehub_db::Store;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::instrument;

use crate::commit_log::{COMMIT_COLUMNS, commit_from_row};
use crate::contributors::require_admin_tx;
use crate::error::CoreError;
use crate::model::ordering::from_micros;
use crate::model::{Branch, BranchId, BranchName, BranchSummary, RepoId, Repository, UserId};
use crate::repos::repo_by_id_tx;
use crate::users::user_by_id_tx;

const BRANCH_COLUMNS: &str = "b.id, b.repo_id, b.name, b.parent_branch_id, b.base_commit_id,
     b.forked_from_commit_id, b.last_commit_id, b.creator_id, b.created_at";

const BRANCH_COLUMN_COUNT: usize = 9;

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        name: row.get(2)?,
        parent_branch_id: row.get(3)?,
        base_commit_id: row.get(4)?,
        forked_from_commit_id: row.get(5)?,
        last_commit_id: row.get(6)?,
        creator_id: row.get(7)?,
        created_at: from_micros(row.get(8)?),
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<BranchSummary> {
    Ok(BranchSummary {
        branch: branch_from_row(row)?,
        creator: row.get(BRANCH_COLUMN_COUNT)?,
        parent: row.get(BRANCH_COLUMN_COUNT + 1)?,
        last_commit: commit_from_row(row, BRANCH_COLUMN_COUNT + 2)?,
    })
}

fn summary_select() -> String {
    format!(
        "SELECT {BRANCH_COLUMNS}, creator.username, parent.name, {COMMIT_COLUMNS}
         FROM branches b
         JOIN users creator ON creator.id = b.creator_id
         LEFT JOIN branches parent ON parent.id = b.parent_branch_id
         JOIN commits c ON c.id = b.last_commit_id
         JOIN users u ON u.id = c.author_id"
    )
}

pub(crate) fn branch_by_name_tx(
    conn: &Connection,
    repo: &Repository,
    name: &BranchName,
) -> Result<Branch, CoreError> {
    conn.query_row(
        &format!("SELECT {BRANCH_COLUMNS} FROM branches b WHERE b.repo_id = ?1 AND b.name = ?2"),
        params![repo.id, name],
        branch_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::BranchNotFound {
        repo: repo.full_name(),
        branch: name.to_string(),
    })
}

pub(crate) fn branch_by_id_tx(conn: &Connection, id: BranchId) -> Result<Branch, CoreError> {
    conn.query_row(
        &format!("SELECT {BRANCH_COLUMNS} FROM branches b WHERE b.id = ?1"),
        [id],
        branch_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::BranchNotFound {
        repo: "?".to_owned(),
        branch: format!("#{id}"),
    })
}

/// The repository and the named branch in it.
pub(crate) fn locate_branch_tx(
    conn: &Connection,
    repo: RepoId,
    name: &BranchName,
) -> Result<(Repository, Branch), CoreError> {
    let repository = repo_by_id_tx(conn, repo)?;
    let branch = branch_by_name_tx(conn, &repository, name)?;
    Ok((repository, branch))
}

/// Every branch of `repo` with head metadata, creator and parent name, by name.
pub fn list_branches(store: &mut Store, repo: RepoId) -> Result<Vec<BranchSummary>, CoreError> {
    store.read(|tx| {
        repo_by_id_tx(tx, repo)?;
        let mut stmt = tx.prepare(&format!("{} WHERE b.repo_id = ?1 ORDER BY b.name", summary_select()))?;
        let rows = stmt.query_map([repo], summary_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// One branch of `repo` with head metadata.
pub fn get_branch(store: &mut Store, repo: RepoId, name: &BranchName) -> Result<BranchSummary, CoreError> {
    store.read(|tx| {
        let (_, branch) = locate_branch_tx(tx, repo, name)?;
        Ok(tx.query_row(
            &format!("{} WHERE b.id = ?1", summary_select()),
            [branch.id],
            summary_from_row,
        )?)
    })
}

fn in_use_reason(conn: &Connection, repo: &Repository, branch: &Branch) -> Result<Option<String>, CoreError> {
    if repo.default_branch_id == Some(branch.id) {
        return Ok(Some("it is the repository's default branch".to_owned()));
    }
    let pull_requests: i64 = conn.query_row(
        "SELECT count(*) FROM pull_requests WHERE base_branch_id = ?1 OR target_branch_id = ?1",
        [branch.id],
        |row| row.get(0),
    )?;
    if pull_requests > 0 {
        return Ok(Some(format!("referenced by {pull_requests} pull request(s)")));
    }
    let mut stmt = conn.prepare("SELECT name FROM branches WHERE parent_branch_id = ?1 ORDER BY name")?;
    let children = stmt
        .query_map([branch.id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if !children.is_empty() {
        return Ok(Some(format!("forked into {}", children.join(", "))));
    }
    Ok(None)
}

/// Delete a branch with its commits and files. Admin only.
///
/// Refused while the branch is the default branch, is used by a pull request
/// or has forks of its own.
#[instrument(skip_all, fields(repo_id = %repo, branch = %name, actor_id = %actor))]
pub fn delete_branch(store: &mut Store, repo: RepoId, name: &BranchName, actor: UserId) -> Result<(), CoreError> {
    let (commits, files) = store.write(|tx| {
        let (repository, branch) = locate_branch_tx(tx, repo, name)?;
        let actor = user_by_id_tx(tx, actor)?;
        require_admin_tx(tx, &repository, &actor, &format!("delete branch '{name}'"))?;
        if let Some(reason) = in_use_reason(tx, &repository, &branch)? {
            return Err(CoreError::BranchInUse {
                branch: name.to_string(),
                reason,
            });
        }

        tx.execute(
            "UPDATE branches SET last_commit_id = NULL, base_commit_id = NULL, forked_from_commit_id = NULL
             WHERE id = ?1",
            [branch.id],
        )?;
        let files = tx.execute(
            "DELETE FROM files WHERE commit_id IN (SELECT id FROM commits WHERE branch_id = ?1)",
            [branch.id],
        )?;
        let commits = tx.execute("DELETE FROM commits WHERE branch_id = ?1", [branch.id])?;
        tx.execute("DELETE FROM branches WHERE id = ?1", [branch.id])?;
        Ok::<_, CoreError>((commits, files))
    })?;
    tracing::info!(commits, files, "branch deleted");
    Ok(())
}
