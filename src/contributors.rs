//! Contributor membership.
//!
//! Every user who writes to a repository ends up with exactly one
//! `contributors` row for it. Write paths call [`ensure_contributor_tx`]
//! inside their own transaction, so the row and the write commit together.
//! The insert is `ON CONFLICT DO NOTHING` on the `(repo_id, user_id)` key:
//! concurrent callers cannot produce a duplicate and never downgrade an
//! existing role.

use forgehub_db::Store;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::instrument;

use crate::error::CoreError;
use crate::model::ordering::{from_micros, now_micros};
use crate::model::{Contributor, RepoId, Repository, Role, User, UserId};
use crate::repos::repo_by_id_tx;
use crate::users::user_by_id_tx;

fn contributor_from_row(row: &Row<'_>) -> rusqlite::Result<Contributor> {
    Ok(Contributor {
        repo_id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        role: row.get(3)?,
        created_at: from_micros(row.get(4)?),
    })
}

const CONTRIBUTOR_SELECT: &str = "SELECT c.repo_id, c.user_id, u.username, c.role, c.created_at
     FROM contributors c JOIN users u ON u.id = c.user_id";

/// Insert a `(repo, user)` membership with `role` unless one exists.
///
/// Returns `true` if a row was inserted.
pub(crate) fn ensure_contributor_tx(
    conn: &Connection,
    repo: RepoId,
    user: UserId,
    role: Role,
) -> Result<bool, CoreError> {
    let inserted = conn.execute(
        "INSERT INTO contributors (repo_id, user_id, role, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (repo_id, user_id) DO NOTHING",
        params![repo, user, role, now_micros()],
    )?;
    if inserted > 0 {
        tracing::debug!(repo_id = %repo, user_id = %user, %role, "contributor added");
    }
    Ok(inserted > 0)
}

pub(crate) fn role_tx(conn: &Connection, repo: RepoId, user: UserId) -> Result<Option<Role>, CoreError> {
    Ok(conn
        .query_row(
            "SELECT role FROM contributors WHERE repo_id = ?1 AND user_id = ?2",
            params![repo, user],
            |row| row.get(0),
        )
        .optional()?)
}

/// Fail with `Forbidden` unless `actor` is an Admin of `repo`.
pub(crate) fn require_admin_tx(
    conn: &Connection,
    repo: &Repository,
    actor: &User,
    action: &str,
) -> Result<(), CoreError> {
    match role_tx(conn, repo.id, actor.id)? {
        Some(Role::Admin) => Ok(()),
        Some(Role::Contributor) => Err(CoreError::forbidden(
            &actor.username,
            action,
            format!("requires admin role on '{}'", repo.full_name()),
        )),
        None => Err(CoreError::forbidden(
            &actor.username,
            action,
            format!("not a contributor of '{}'", repo.full_name()),
        )),
    }
}

fn contributor_tx(conn: &Connection, repo: &Repository, user: &User) -> Result<Contributor, CoreError> {
    conn.query_row(
        &format!("{CONTRIBUTOR_SELECT} WHERE c.repo_id = ?1 AND c.user_id = ?2"),
        params![repo.id, user.id],
        contributor_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::ContributorNotFound {
        repo: repo.full_name(),
        user: user.username.to_string(),
    })
}

/// Make `user` a Contributor of `repo` if they are not a member yet.
///
/// Idempotent and safe under concurrent callers. Returns `true` if the row
/// was created by this call.
#[instrument(skip_all, fields(repo_id = %repo, user_id = %user))]
pub fn ensure_contributor(store: &mut Store, repo: RepoId, user: UserId) -> Result<bool, CoreError> {
    store.write(|tx| {
        repo_by_id_tx(tx, repo)?;
        user_by_id_tx(tx, user)?;
        ensure_contributor_tx(tx, repo, user, Role::Contributor)
    })
}

/// Grant `user` membership with an explicit role. Admin only.
#[instrument(skip_all, fields(repo_id = %repo, user_id = %user, %role))]
pub fn add_contributor(
    store: &mut Store,
    repo: RepoId,
    actor: UserId,
    user: UserId,
    role: Role,
) -> Result<Contributor, CoreError> {
    let contributor = store.write(|tx| {
        let repository = repo_by_id_tx(tx, repo)?;
        let actor = user_by_id_tx(tx, actor)?;
        let user = user_by_id_tx(tx, user)?;
        require_admin_tx(tx, &repository, &actor, "add contributors")?;
        if !ensure_contributor_tx(tx, repo, user.id, role)? {
            return Err(CoreError::DuplicateContributor {
                repo: repository.full_name(),
                user: user.username.to_string(),
            });
        }
        contributor_tx(tx, &repository, &user)
    })?;
    tracing::info!("contributor granted");
    Ok(contributor)
}

/// Change a member's role. Admin only; the owner always stays Admin.
#[instrument(skip_all, fields(repo_id = %repo, user_id = %user, %role))]
pub fn set_role(
    store: &mut Store,
    repo: RepoId,
    actor: UserId,
    user: UserId,
    role: Role,
) -> Result<Contributor, CoreError> {
    let contributor = store.write(|tx| {
        let repository = repo_by_id_tx(tx, repo)?;
        let actor = user_by_id_tx(tx, actor)?;
        let user = user_by_id_tx(tx, user)?;
        require_admin_tx(tx, &repository, &actor, "change roles")?;
        let current = contributor_tx(tx, &repository, &user)?;
        if user.id == repository.owner_id && !role.is_admin() {
            return Err(CoreError::OwnerRoleLocked {
                repo: repository.full_name(),
            });
        }
        if current.role == role {
            return Ok(current);
        }
        tx.execute(
            "UPDATE contributors SET role = ?3 WHERE repo_id = ?1 AND user_id = ?2",
            params![repo, user.id, role],
        )?;
        Ok(Contributor { role, ..current })
    })?;
    tracing::info!("contributor role set");
    Ok(contributor)
}

/// Members of `repo`, ordered by username.
pub fn list_contributors(store: &mut Store, repo: RepoId) -> Result<Vec<Contributor>, CoreError> {
    store.read(|tx| {
        repo_by_id_tx(tx, repo)?;
        let mut stmt = tx.prepare(&format!(
            "{CONTRIBUTOR_SELECT} WHERE c.repo_id = ?1 ORDER BY u.username"
        ))?;
        let rows = stmt.query_map([repo], contributor_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}
