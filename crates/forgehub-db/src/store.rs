//! The store handle and its transaction scopes.
//!
//! A [`Store`] owns one SQLite connection. It is `Send` but not `Sync`:
//! concurrent callers each open their own handle on the same file and SQLite
//! arbitrates between them.
//!
//! # Isolation
//!
//! | Scope | SQLite mode | Guarantee |
//! |---|---|---|
//! | [`Store::read`]  | `BEGIN DEFERRED` on a WAL database | one consistent snapshot for the whole closure |
//! | [`Store::write`] | `BEGIN IMMEDIATE` | database write lock held from the first statement; serializable |
//!
//! A writer that cannot take the lock within the busy timeout gets
//! [`DbError::Busy`], which callers surface as a retryable failure.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::DbError;
use crate::schema;

/// Path SQLite uses for a private in-memory database.
const MEMORY_PATH: &str = ":memory:";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// `PRAGMA synchronous` levels exposed through configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Synchronous {
    /// No fsync; fastest, not crash safe.
    Off,
    /// fsync at WAL checkpoints.
    Normal,
    /// fsync on every commit.
    #[default]
    Full,
}

impl Synchronous {
    const fn pragma_value(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

impl fmt::Display for Synchronous {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pragma_value().to_ascii_lowercase())
    }
}

/// Connection settings applied by [`Store::open`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a writer waits for the write lock before giving up.
    pub busy_timeout: Duration,
    /// Durability level.
    pub synchronous: Synchronous,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            synchronous: Synchronous::Full,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// An open handle on the forgehub database.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish_non_exhaustive()
    }
}

impl Store {
    /// Open (creating if needed) the database at `path` and migrate it.
    ///
    /// The database is put in WAL mode so readers never block the writer and
    /// each read transaction sees a stable snapshot.
    pub fn open(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self, DbError> {
        let path = path.as_ref().to_owned();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| DbError::Open {
                path: path.clone(),
                message: format!("could not create directory {}: {e}", parent.display()),
            })?;
        }

        let conn = Connection::open(&path).map_err(|e| DbError::Open {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| DbError::Open {
                path: path.clone(),
                message: format!("could not enable WAL: {e}"),
            })?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            return Err(DbError::Open {
                path,
                message: format!(
                    "SQLite kept journal_mode '{journal_mode}'; snapshot reads need WAL \
                     (network filesystems without shared memory are not supported)"
                ),
            });
        }

        Self::configure(conn, path, options)
    }

    /// Open a private in-memory database, migrated and ready.
    ///
    /// Only the returned handle can see it; used by unit tests and dry runs.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().map_err(|e| DbError::Open {
            path: PathBuf::from(MEMORY_PATH),
            message: e.to_string(),
        })?;
        Self::configure(conn, PathBuf::from(MEMORY_PATH), &StoreOptions::default())
    }

    fn configure(mut conn: Connection, path: PathBuf, options: &StoreOptions) -> Result<Self, DbError> {
        conn.busy_timeout(options.busy_timeout)?;
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA synchronous = {};",
            options.synchronous.pragma_value()
        ))?;
        schema::migrate(&mut conn)?;
        tracing::debug!(path = %path.display(), "store opened");
        Ok(Self { conn, path })
    }

    /// Path of the underlying database (`:memory:` for in-memory stores).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside a read-only snapshot transaction.
    ///
    /// The transaction is always rolled back; `f` must not write.
    pub fn read<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(DbError::from)?;
        let out = f(&tx)?;
        tx.rollback().map_err(DbError::from)?;
        Ok(out)
    }

    /// Run `f` inside a write transaction holding the database write lock.
    ///
    /// Commits if `f` returns `Ok`; any `Err` (or panic) rolls every statement
    /// back, so no partial rows are ever visible.
    pub fn write<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DbError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(DbError::from)?;
        Ok(out)
    }

    /// Current schema version of the open database.
    pub fn schema_version(&self) -> Result<i64, DbError> {
        schema::schema_version(&self.conn)
    }
}
