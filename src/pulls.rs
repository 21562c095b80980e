//! Pull requests and reviews.
//!
//! A pull request names two branches of one repository and never touches
//! their files. Each reviewer holds at most one review per pull request:
//! reviewing again replaces the comment and advances `updated_at`.

use forgehub_db::Store;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::instrument;

use crate::branches::branch_by_name_tx;
use crate::error::CoreError;
use crate::model::ordering::{from_micros, now_micros};
use crate::model::{
    BranchName, PullRequest, PullRequestId, PullRequestStatus, PullRequestSummary, RepoId, Review, UserId,
};
use crate::repos::repo_by_id_tx;
use crate::users::user_by_id_tx;

/// What to open a pull request for.
#[derive(Clone, Debug)]
pub struct NewPullRequest {
    /// Branch the changes are proposed into.
    pub base: BranchName,
    /// Branch carrying the changes.
    pub target: BranchName,
    pub title: String,
    pub description: String,
}

impl NewPullRequest {
    #[must_use]
    pub fn new(base: BranchName, target: BranchName, title: impl Into<String>) -> Self {
        Self {
            base,
            target,
            title: title.into(),
            description: String::new(),
        }
    }
}

const PR_SUMMARY_SELECT: &str = "SELECT p.id, p.repo_id, p.creator_id, p.base_branch_id, p.target_branch_id,
            p.title, p.description, p.status, p.created_at,
            u.username, base.name, target.name
     FROM pull_requests p
     JOIN users u ON u.id = p.creator_id
     JOIN branches base ON base.id = p.base_branch_id
     JOIN branches target ON target.id = p.target_branch_id";

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<PullRequestSummary> {
    Ok(PullRequestSummary {
        pull_request: PullRequest {
            id: row.get(0)?,
            repo_id: row.get(1)?,
            creator_id: row.get(2)?,
            base_branch_id: row.get(3)?,
            target_branch_id: row.get(4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            status: row.get(7)?,
            created_at: from_micros(row.get(8)?),
        },
        creator: row.get(9)?,
        base_branch: row.get(10)?,
        target_branch: row.get(11)?,
    })
}

const REVIEW_SELECT: &str = "SELECT r.pr_id, r.reviewer_id, u.username, r.comment, r.created_at, r.updated_at
     FROM pull_request_reviews r JOIN users u ON u.id = r.reviewer_id";

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        pr_id: row.get(0)?,
        reviewer_id: row.get(1)?,
        reviewer: row.get(2)?,
        comment: row.get(3)?,
        created_at: from_micros(row.get(4)?),
        updated_at: from_micros(row.get(5)?),
    })
}

fn pull_request_tx(conn: &Connection, id: PullRequestId) -> Result<PullRequestSummary, CoreError> {
    conn.query_row(&format!("{PR_SUMMARY_SELECT} WHERE p.id = ?1"), [id], summary_from_row)
        .optional()?
        .ok_or(CoreError::PullRequestNotFound { id })
}

/// Open a pull request from `target` into `base`.
///
/// Both branches must belong to `repo`.
#[instrument(skip_all, fields(repo_id = %repo, creator_id = %creator, base = %new.base, target = %new.target))]
pub fn create_pull_request(
    store: &mut Store,
    repo: RepoId,
    creator: UserId,
    new: &NewPullRequest,
) -> Result<PullRequestSummary, CoreError> {
    if new.title.trim().is_empty() {
        return Err(CoreError::invalid("title", "must not be empty"));
    }
    let pull_request = store.write(|tx| {
        let repository = repo_by_id_tx(tx, repo)?;
        let creator = user_by_id_tx(tx, creator)?;
        let base = branch_by_name_tx(tx, &repository, &new.base)?;
        let target = branch_by_name_tx(tx, &repository, &new.target)?;
        tx.execute(
            "INSERT INTO pull_requests
                (repo_id, creator_id, base_branch_id, target_branch_id, title, description, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                repo,
                creator.id,
                base.id,
                target.id,
                new.title,
                new.description,
                PullRequestStatus::Open,
                now_micros()
            ],
        )?;
        pull_request_tx(tx, PullRequestId(tx.last_insert_rowid()))
    })?;
    tracing::info!(pr_id = %pull_request.pull_request.id, "pull request opened");
    Ok(pull_request)
}

/// Record `reviewer`'s review of `pr`, replacing any earlier one.
#[instrument(skip_all, fields(pr_id = %pr, reviewer_id = %reviewer))]
pub fn add_review(
    store: &mut Store,
    pr: PullRequestId,
    reviewer: UserId,
    comment: &str,
) -> Result<Review, CoreError> {
    if comment.trim().is_empty() {
        return Err(CoreError::invalid("comment", "must not be empty"));
    }
    let review = store.write(|tx| {
        pull_request_tx(tx, pr)?;
        let reviewer = user_by_id_tx(tx, reviewer)?;
        tx.execute(
            "INSERT INTO pull_request_reviews (pr_id, reviewer_id, comment, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (pr_id, reviewer_id)
             DO UPDATE SET comment = excluded.comment,
                           updated_at = max(excluded.updated_at, pull_request_reviews.updated_at)",
            params![pr, reviewer.id, comment, now_micros()],
        )?;
        Ok::<_, CoreError>(tx.query_row(
            &format!("{REVIEW_SELECT} WHERE r.pr_id = ?1 AND r.reviewer_id = ?2"),
            params![pr, reviewer.id],
            review_from_row,
        )?)
    })?;
    tracing::info!("review recorded");
    Ok(review)
}

/// Pull requests of `repo`, newest first.
pub fn list_pull_requests(store: &mut Store, repo: RepoId) -> Result<Vec<PullRequestSummary>, CoreError> {
    store.read(|tx| {
        repo_by_id_tx(tx, repo)?;
        let mut stmt = tx.prepare(&format!(
            "{PR_SUMMARY_SELECT} WHERE p.repo_id = ?1 ORDER BY p.created_at DESC, p.id DESC"
        ))?;
        let rows = stmt.query_map([repo], summary_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// One pull request.
pub fn get_pull_request(store: &mut Store, pr: PullRequestId) -> Result<PullRequestSummary, CoreError> {
    store.read(|tx| pull_request_tx(tx, pr))
}

/// Reviews of `pr`, oldest first.
pub fn list_reviews(store: &mut Store, pr: PullRequestId) -> Result<Vec<Review>, CoreError> {
    store.read(|tx| {
        pull_request_tx(tx, pr)?;
        let mut stmt = tx.prepare(&format!(
            "{REVIEW_SELECT} WHERE r.pr_id = ?1 ORDER BY r.created_at, u.username"
        ))?;
        let rows = stmt.query_map([pr], review_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::config::RepositoryConfig;
    use crate::model::RepoName;
    use crate::repos::{NewRepository, create_repository};
    use crate::testing::Fixture;

    fn open_pr(fx: &mut Fixture, topic: &str, title: &str) -> PullRequestSummary {
        let main = fx.main();
        let topic = fx.fork(&main, topic, fx.alice.id);
        create_pull_request(
            &mut fx.store,
            fx.repo.id,
            fx.alice.id,
            &NewPullRequest::new(main, topic.name, title),
        )
        .unwrap()
    }

    #[test]
    fn create_and_get() {
        let mut fx = Fixture::new();
        let pr = open_pr(&mut fx, "topic", "first");
        assert_eq!(pr.pull_request.status, PullRequestStatus::Open);
        assert_eq!(pr.base_branch.as_str(), "main");
        assert_eq!(pr.creator, fx.alice.username);
        assert_eq!(get_pull_request(&mut fx.store, pr.pull_request.id).unwrap(), pr);
    }

    #[test]
    fn list_is_newest_first() {
        let mut fx = Fixture::new();
        let a = open_pr(&mut fx, "a", "a");
        let b = open_pr(&mut fx, "b", "b");
        let listed = list_pull_requests(&mut fx.store, fx.repo.id).unwrap();
        let ids: Vec<_> = listed.iter().map(|p| p.pull_request.id).collect();
        assert_eq!(ids, vec![b.pull_request.id, a.pull_request.id]);
    }

    #[test]
    fn branches_must_belong_to_repo() {
        let mut fx = Fixture::new();
        let other = create_repository(
            &mut fx.store,
            &RepositoryConfig::default(),
            fx.alice.id,
            &NewRepository::new(RepoName::new("other").unwrap()),
        )
        .unwrap();
        let main = fx.main();
        fx.fork(&main, "only-in-proj", fx.alice.id);

        let err = create_pull_request(
            &mut fx.store,
            other.id,
            fx.alice.id,
            &NewPullRequest::new(main, "only-in-proj".parse().unwrap(), "cross"),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::BranchNotFound { .. }));
    }

    #[test]
    fn empty_title_is_invalid() {
        let mut fx = Fixture::new();
        let main = fx.main();
        let err = create_pull_request(
            &mut fx.store,
            fx.repo.id,
            fx.alice.id,
            &NewPullRequest::new(main.clone(), main, "  "),
        )
        .unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidInput);
    }

    #[test]
    fn second_review_replaces_first() {
        let mut fx = Fixture::new();
        let pr = open_pr(&mut fx, "topic", "review me").pull_request.id;
        let bob = fx.user("bob");

        let first = add_review(&mut fx.store, pr, bob.id, "needs work").unwrap();
        let second = add_review(&mut fx.store, pr, bob.id, "looks good").unwrap();
        assert_eq!(second.comment, "looks good");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);

        add_review(&mut fx.store, pr, fx.alice.id, "thanks").unwrap();
        let reviews = list_reviews(&mut fx.store, pr).unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].reviewer, bob.username);
    }

    #[test]
    fn review_of_unknown_pr_is_not_found() {
        let mut fx = Fixture::new();
        let err = add_review(&mut fx.store, PullRequestId(41), fx.alice.id, "hi").unwrap_err();
        assert!(matches!(err, CoreError::PullRequestNotFound { .. }));
    }
}
