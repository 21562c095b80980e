//! Issue workflow.
//!
//! An issue moves between `Open` and `Closed` and nothing else. Only its
//! creator or its current assignee may change it; an update by anyone else
//! fails with `Forbidden` and leaves every field as it was.

use forgehub_db::Store;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::instrument;

use crate::error::CoreError;
use crate::model::ordering::{from_micros, now_micros};
use crate::model::{Issue, IssueId, IssueStatus, RepoId, User, UserId};
use crate::repos::repo_by_id_tx;
use crate::users::user_by_id_tx;

/// Fields of an issue to open.
#[derive(Clone, Debug, Default)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub assignee: Option<UserId>,
}

/// A partial update. `None` keeps the current value.
///
/// `assignee` is doubly optional: `Some(None)` clears the assignee,
/// `Some(Some(id))` sets it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssuePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<IssueStatus>,
    pub assignee: Option<Option<UserId>>,
}

impl IssuePatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.status.is_none() && self.assignee.is_none()
    }

    /// Whether applying the patch to `issue` would change its assignee.
    #[must_use]
    pub fn reassigns(&self, issue: &Issue) -> bool {
        self.assignee.is_some_and(|assignee| assignee != issue.assignee_id)
    }
}

const ISSUE_COLUMNS: &str =
    "id, repo_id, creator_id, assignee_id, title, description, status, created_at, updated_at";

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        creator_id: row.get(2)?,
        assignee_id: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        status: row.get(6)?,
        created_at: from_micros(row.get(7)?),
        updated_at: from_micros(row.get(8)?),
    })
}

fn issue_tx(conn: &Connection, id: IssueId) -> Result<Issue, CoreError> {
    conn.query_row(
        &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1"),
        [id],
        issue_from_row,
    )
    .optional()?
    .ok_or(CoreError::IssueNotFound { id })
}

fn validate_title(title: &str) -> Result<(), CoreError> {
    if title.trim().is_empty() {
        return Err(CoreError::invalid("title", "must not be empty"));
    }
    Ok(())
}

/// Open an issue in `repo`.
#[instrument(skip_all, fields(repo_id = %repo, creator_id = %creator))]
pub fn create_issue(store: &mut Store, repo: RepoId, creator: UserId, new: &NewIssue) -> Result<Issue, CoreError> {
    validate_title(&new.title)?;
    let issue = store.write(|tx| {
        repo_by_id_tx(tx, repo)?;
        let creator = user_by_id_tx(tx, creator)?;
        if let Some(assignee) = new.assignee {
            user_by_id_tx(tx, assignee)?;
        }
        let now = now_micros();
        tx.execute(
            "INSERT INTO issues (repo_id, creator_id, assignee_id, title, description, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![repo, creator.id, new.assignee, new.title, new.description, IssueStatus::Open, now],
        )?;
        issue_tx(tx, IssueId(tx.last_insert_rowid()))
    })?;
    tracing::info!(issue_id = %issue.id, "issue opened");
    Ok(issue)
}

/// Who may change an issue's assignee.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReassignRule {
    /// Anyone allowed to edit the issue.
    #[default]
    CreatorOrAssignee,
    /// The creator alone; the assignee may still edit everything else.
    CreatorOnly,
}

/// Apply `patch` to an issue on behalf of `actor`.
///
/// Allowed for the creator and the current assignee only.
pub fn update_issue(store: &mut Store, id: IssueId, actor: UserId, patch: &IssuePatch) -> Result<Issue, CoreError> {
    update_issue_with(store, id, actor, patch, ReassignRule::CreatorOrAssignee)
}

/// [`update_issue`] with an explicit reassignment rule.
///
/// Both rules are checked against the row read inside the write transaction.
#[instrument(skip_all, fields(issue_id = %id, actor_id = %actor, rule = ?rule))]
pub fn update_issue_with(
    store: &mut Store,
    id: IssueId,
    actor: UserId,
    patch: &IssuePatch,
    rule: ReassignRule,
) -> Result<Issue, CoreError> {
    if let Some(title) = &patch.title {
        validate_title(title)?;
    }
    let issue = store.write(|tx| {
        let current = issue_tx(tx, id)?;
        let actor = user_by_id_tx(tx, actor)?;
        if actor.id != current.creator_id && Some(actor.id) != current.assignee_id {
            return Err(CoreError::forbidden(
                &actor.username,
                format!("edit issue #{id}"),
                "only the creator or the assignee may edit an issue",
            ));
        }
        if rule == ReassignRule::CreatorOnly {
            authorize_reassignment(&current, &actor, patch)?;
        }
        if let Some(Some(assignee)) = patch.assignee {
            user_by_id_tx(tx, assignee)?;
        }
        if patch.is_empty() {
            return Ok(current);
        }

        let title = patch.title.as_deref().unwrap_or(&current.title);
        let description = patch.description.as_deref().unwrap_or(&current.description);
        let status = patch.status.unwrap_or(current.status);
        let assignee = patch.assignee.unwrap_or(current.assignee_id);
        tx.execute(
            "UPDATE issues
             SET title = ?2, description = ?3, status = ?4, assignee_id = ?5,
                 updated_at = max(?6, updated_at)
             WHERE id = ?1",
            params![id, title, description, status, assignee, now_micros()],
        )?;
        issue_tx(tx, id)
    })?;
    tracing::info!(status = %issue.status, "issue updated");
    Ok(issue)
}

/// Only the creator may change who an issue is assigned to.
///
/// Pure check against a row already read; [`update_issue_with`] applies it
/// under [`ReassignRule::CreatorOnly`].
pub fn authorize_reassignment(issue: &Issue, actor: &User, patch: &IssuePatch) -> Result<(), CoreError> {
    if patch.reassigns(issue) && actor.id != issue.creator_id {
        return Err(CoreError::forbidden(
            &actor.username,
            format!("reassign issue #{}", issue.id),
            "only the creator may change the assignee",
        ));
    }
    Ok(())
}

/// One issue.
pub fn get_issue(store: &mut Store, id: IssueId) -> Result<Issue, CoreError> {
    store.read(|tx| issue_tx(tx, id))
}

/// Issues of `repo`, newest first, optionally only those in `status`.
pub fn list_issues(store: &mut Store, repo: RepoId, status: Option<IssueStatus>) -> Result<Vec<Issue>, CoreError> {
    store.read(|tx| {
        repo_by_id_tx(tx, repo)?;
        let mut stmt = tx.prepare(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues
             WHERE repo_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![repo, status], issue_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}
