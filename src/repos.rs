//! Repositories.
//!
//! A repository is addressed by `owner/name`. Creating one also creates its
//! root branch with an initial commit and records the owner as Admin, all
//! in the same write transaction.

use forgehub_db::Store;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::instrument;

use crate::commit_log::{CommitPayload, NewFile, append_commit_tx};
use crate::config::RepositoryConfig;
use crate::contributors::{ensure_contributor_tx, require_admin_tx};
use crate::error::CoreError;
use crate::model::ordering::{from_micros, now_micros};
use crate::model::{BranchId, FileName, RepoId, RepoName, Repository, Role, UserId, Username, Visibility};
use crate::users::{user_by_id_tx, user_by_name_tx};

/// Message of the commit every root branch starts with.
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

/// Name of the generated readme.
pub const README_FILE: &str = "README.md";

const REPO_SELECT: &str = "SELECT r.id, r.owner_id, u.username, r.name, r.description, r.is_private,
            r.default_branch_id, r.created_at
     FROM repositories r JOIN users u ON u.id = r.owner_id";

fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        visibility: Visibility::from_private_flag(row.get(5)?),
        default_branch_id: row.get(6)?,
        created_at: from_micros(row.get(7)?),
    })
}

/// Fields of a repository to create.
#[derive(Clone, Debug)]
pub struct NewRepository {
    pub name: RepoName,
    pub description: String,
    pub visibility: Visibility,
    /// Put a generated `README.md` in the initial commit. `None` uses
    /// `repository.initial_readme`.
    pub init_readme: Option<bool>,
}

impl NewRepository {
    /// A public repository with no description and the configured readme default.
    #[must_use]
    pub fn new(name: RepoName) -> Self {
        Self {
            name,
            description: String::new(),
            visibility: Visibility::Public,
            init_readme: None,
        }
    }
}

/// Mutable repository settings. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default)]
pub struct RepositoryPatch {
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

impl RepositoryPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.description.is_none() && self.visibility.is_none()
    }
}

fn readme(name: &RepoName, description: &str) -> Vec<u8> {
    let mut text = format!("# {name}\n");
    if !description.is_empty() {
        text.push('\n');
        text.push_str(description);
        text.push('\n');
    }
    text.into_bytes()
}

/// Create a repository owned by `owner`.
#[instrument(skip_all, fields(owner_id = %owner, repo = %new.name))]
pub fn create_repository(
    store: &mut Store,
    defaults: &RepositoryConfig,
    owner: UserId,
    new: &NewRepository,
) -> Result<Repository, CoreError> {
    let init_readme = new.init_readme.unwrap_or(defaults.initial_readme);
    let repository = store.write(|tx| {
        let owner = user_by_id_tx(tx, owner)?;
        let full_name = format!("{}/{}", owner.username, new.name);

        let taken: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM repositories WHERE owner_id = ?1 AND name = ?2)",
            params![owner.id, new.name],
            |row| row.get(0),
        )?;
        if taken {
            return Err(CoreError::DuplicateRepository { repo: full_name });
        }

        let now = now_micros();
        tx.execute(
            "INSERT INTO repositories (owner_id, name, description, is_private, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![owner.id, new.name, new.description, new.visibility.is_private(), now],
        )?;
        let repo_id = RepoId(tx.last_insert_rowid());

        tx.execute(
            "INSERT INTO branches (repo_id, name, creator_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![repo_id, defaults.default_branch, owner.id, now],
        )?;
        let branch_id = BranchId(tx.last_insert_rowid());

        // Before the first append, so its lazy Contributor insert is a no-op.
        ensure_contributor_tx(tx, repo_id, owner.id, Role::Admin)?;

        let files = if init_readme {
            vec![NewFile::new(
                FileName::new(README_FILE)?,
                readme(&new.name, &new.description),
            )]
        } else {
            Vec::new()
        };
        let initial = append_commit_tx(
            tx,
            repo_id,
            branch_id,
            &owner,
            INITIAL_COMMIT_MESSAGE,
            CommitPayload::Upload(&files),
        )?;
        tx.execute(
            "UPDATE branches SET base_commit_id = ?2 WHERE id = ?1",
            params![branch_id, initial.id],
        )?;
        tx.execute(
            "UPDATE repositories SET default_branch_id = ?2 WHERE id = ?1",
            params![repo_id, branch_id],
        )?;

        repo_by_id_tx(tx, repo_id)
    })?;
    tracing::info!(repo_id = %repository.id, "repository created");
    Ok(repository)
}

/// Look up `owner/name`.
pub fn get_repository(
    store: &mut Store,
    owner: &Username,
    name: &RepoName,
) -> Result<Repository, CoreError> {
    store.read(|tx| repo_by_name_tx(tx, owner, name))
}

/// Look up a repository by id.
pub fn get_repository_by_id(store: &mut Store, id: RepoId) -> Result<Repository, CoreError> {
    store.read(|tx| repo_by_id_tx(tx, id))
}

/// Repositories owned by `owner`, by name.
pub fn list_repositories(store: &mut Store, owner: &Username) -> Result<Vec<Repository>, CoreError> {
    store.read(|tx| {
        let owner = user_by_name_tx(tx, owner)?;
        let mut stmt = tx.prepare(&format!("{REPO_SELECT} WHERE r.owner_id = ?1 ORDER BY r.name"))?;
        let rows = stmt.query_map([owner.id], repo_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Change description and/or visibility. Admin only.
#[instrument(skip_all, fields(repo_id = %repo, actor_id = %actor))]
pub fn update_repository(
    store: &mut Store,
    repo: RepoId,
    actor: UserId,
    patch: &RepositoryPatch,
) -> Result<Repository, CoreError> {
    let repository = store.write(|tx| {
        let repository = repo_by_id_tx(tx, repo)?;
        let actor = user_by_id_tx(tx, actor)?;
        require_admin_tx(tx, &repository, &actor, "update repository settings")?;
        if let Some(description) = &patch.description {
            tx.execute(
                "UPDATE repositories SET description = ?2 WHERE id = ?1",
                params![repo, description],
            )?;
        }
        if let Some(visibility) = patch.visibility {
            tx.execute(
                "UPDATE repositories SET is_private = ?2 WHERE id = ?1",
                params![repo, visibility.is_private()],
            )?;
        }
        repo_by_id_tx(tx, repo)
    })?;
    tracing::info!(visibility = %repository.visibility, "repository updated");
    Ok(repository)
}

pub(crate) fn repo_by_id_tx(conn: &Connection, id: RepoId) -> Result<Repository, CoreError> {
    conn.query_row(&format!("{REPO_SELECT} WHERE r.id = ?1"), [id], repo_from_row)
        .optional()?
        .ok_or_else(|| CoreError::RepositoryNotFound {
            repo: format!("#{id}"),
        })
}

pub(crate) fn repo_by_name_tx(
    conn: &Connection,
    owner: &Username,
    name: &RepoName,
) -> Result<Repository, CoreError> {
    conn.query_row(
        &format!("{REPO_SELECT} WHERE u.username = ?1 AND r.name = ?2"),
        params![owner, name],
        repo_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::RepositoryNotFound {
        repo: format!("{owner}/{name}"),
    })
}
