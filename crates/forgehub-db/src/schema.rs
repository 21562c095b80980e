//! Relational schema and migrations.
//!
//! The database carries a single-row `schema_version` table. [`migrate`]
//! runs every step in [`MIGRATIONS`] above the recorded version inside one
//! write transaction, so two processes opening a fresh file at the same time
//! cannot both apply a step.
//!
//! # Table overview
//!
//! ```text
//! users ──< repositories ──< branches ──< commits ──< files
//!                │              ▲  │
//!                │              └──┘ parent_branch_id
//!                ├──< contributors          (repo_id, user_id) PK
//!                ├──< pull_requests ──< pull_request_reviews (pr_id, reviewer_id) PK
//!                └──< issues
//! ```
//!
//! `commits.id` is `AUTOINCREMENT` so ids are never reused and grow with
//! insertion order; it is the tie-break of the `(commit_ts, id)` total order.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

use crate::error::DbError;

/// Version written by the last entry of [`MIGRATIONS`].
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Ordered migration steps; index `i` upgrades version `i` to `i + 1`.
pub const MIGRATIONS: &[&str] = &[
    // v1: identities, history, collaboration records.
    r"
    CREATE TABLE users (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        username    TEXT    NOT NULL UNIQUE,
        email       TEXT    NOT NULL,
        created_at  INTEGER NOT NULL
    );

    CREATE TABLE repositories (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id           INTEGER NOT NULL REFERENCES users(id),
        name               TEXT    NOT NULL,
        description        TEXT    NOT NULL DEFAULT '',
        is_private         INTEGER NOT NULL DEFAULT 0,
        default_branch_id  INTEGER REFERENCES branches(id),
        created_at         INTEGER NOT NULL,
        UNIQUE (owner_id, name)
    );

    CREATE TABLE branches (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        repo_id           INTEGER NOT NULL REFERENCES repositories(id),
        name              TEXT    NOT NULL,
        parent_branch_id  INTEGER REFERENCES branches(id),
        base_commit_id    INTEGER REFERENCES commits(id),
        last_commit_id    INTEGER REFERENCES commits(id),
        creator_id        INTEGER NOT NULL REFERENCES users(id),
        created_at        INTEGER NOT NULL,
        UNIQUE (repo_id, name)
    );

    CREATE TABLE commits (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        branch_id  INTEGER NOT NULL REFERENCES branches(id),
        author_id  INTEGER NOT NULL REFERENCES users(id),
        message    TEXT    NOT NULL,
        commit_ts  INTEGER NOT NULL
    );
    CREATE INDEX commits_branch_order ON commits (branch_id, commit_ts, id);

    CREATE TABLE files (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        commit_id  INTEGER NOT NULL REFERENCES commits(id),
        file_name  TEXT    NOT NULL,
        content    BLOB    NOT NULL,
        size       INTEGER NOT NULL
    );
    CREATE INDEX files_commit ON files (commit_id);
    CREATE INDEX files_name ON files (file_name, commit_id);

    CREATE TABLE contributors (
        repo_id     INTEGER NOT NULL REFERENCES repositories(id),
        user_id     INTEGER NOT NULL REFERENCES users(id),
        role        TEXT    NOT NULL CHECK (role IN ('contributor', 'admin')),
        created_at  INTEGER NOT NULL,
        PRIMARY KEY (repo_id, user_id)
    );

    CREATE TABLE pull_requests (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        repo_id           INTEGER NOT NULL REFERENCES repositories(id),
        creator_id        INTEGER NOT NULL REFERENCES users(id),
        base_branch_id    INTEGER NOT NULL REFERENCES branches(id),
        target_branch_id  INTEGER NOT NULL REFERENCES branches(id),
        title             TEXT    NOT NULL,
        description       TEXT    NOT NULL DEFAULT '',
        status            TEXT    NOT NULL CHECK (status IN ('open', 'merged', 'closed')),
        created_at        INTEGER NOT NULL
    );
    CREATE INDEX pull_requests_repo ON pull_requests (repo_id, created_at);

    CREATE TABLE pull_request_reviews (
        pr_id        INTEGER NOT NULL REFERENCES pull_requests(id),
        reviewer_id  INTEGER NOT NULL REFERENCES users(id),
        comment      TEXT    NOT NULL,
        created_at   INTEGER NOT NULL,
        updated_at   INTEGER NOT NULL,
        PRIMARY KEY (pr_id, reviewer_id)
    );

    CREATE TABLE issues (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        repo_id      INTEGER NOT NULL REFERENCES repositories(id),
        creator_id   INTEGER NOT NULL REFERENCES users(id),
        assignee_id  INTEGER REFERENCES users(id),
        title        TEXT    NOT NULL,
        description  TEXT    NOT NULL DEFAULT '',
        status       TEXT    NOT NULL CHECK (status IN ('open', 'closed')),
        created_at   INTEGER NOT NULL,
        updated_at   INTEGER NOT NULL
    );
    CREATE INDEX issues_repo ON issues (repo_id, created_at);
    ",
    // v2: fork provenance and case-insensitive email lookups.
    r"
    ALTER TABLE branches ADD COLUMN forked_from_commit_id INTEGER REFERENCES commits(id);
    CREATE INDEX users_email ON users (email COLLATE NOCASE);
    CREATE INDEX branches_parent ON branches (parent_branch_id);
    ",
];

/// Read the recorded schema version (0 for a fresh database).
pub fn schema_version(conn: &Connection) -> Result<i64, DbError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS schema_version (
            id       INTEGER PRIMARY KEY CHECK (id = 1),
            version  INTEGER NOT NULL
        );
        ",
    )?;
    let version = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?
        .unwrap_or(0);
    Ok(version)
}

/// Bring the schema up to [`CURRENT_SCHEMA_VERSION`].
///
/// # Errors
/// Returns [`DbError::Migration`] if the file was written by a newer build
/// or a step fails; the transaction is rolled back and nothing is applied.
pub fn migrate(conn: &mut Connection) -> Result<i64, DbError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let from = schema_version(&tx)?;

    if from > CURRENT_SCHEMA_VERSION {
        return Err(DbError::Migration {
            from,
            message: format!(
                "database was written by a newer forgehub (schema v{from}, this build knows v{CURRENT_SCHEMA_VERSION})"
            ),
        });
    }

    for (index, step) in MIGRATIONS.iter().enumerate().skip(usize::try_from(from).unwrap_or(0)) {
        let target = i64::try_from(index).unwrap_or(i64::MAX) + 1;
        tx.execute_batch(step).map_err(|e| DbError::Migration {
            from,
            message: format!("step to v{target}: {e}"),
        })?;
        tracing::debug!(version = target, "applied schema migration");
    }

    if from < CURRENT_SCHEMA_VERSION {
        tx.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT (id) DO UPDATE SET version = excluded.version",
            [CURRENT_SCHEMA_VERSION],
        )?;
        tracing::info!(from, to = CURRENT_SCHEMA_VERSION, "schema migrated");
    }

    tx.commit()?;
    Ok(CURRENT_SCHEMA_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 0);
        assert_eq!(migrate(&mut conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'commits'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn partial_database_resumes_from_recorded_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema_version(&conn).unwrap();
        conn.execute_batch(MIGRATIONS[0]).unwrap();
        conn.execute("INSERT INTO schema_version (id, version) VALUES (1, 1)", [])
            .unwrap();

        migrate(&mut conn).unwrap();
        let has_column: i64 = conn
            .query_row(
                "SELECT count(*) FROM pragma_table_info('branches') WHERE name = 'forked_from_commit_id'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(has_column, 1);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema_version(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (id, version) VALUES (1, 99)", [])
            .unwrap();
        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, DbError::Migration { from: 99, .. }));
    }
}
