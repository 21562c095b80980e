//! Total order of commits within a branch.
//!
//! Commits are ordered by `(timestamp, commit_id)`. The timestamp alone is not
//! enough: two appends in the same microsecond, or a wall clock that stepped
//! backwards, would leave "latest" ambiguous. `commit_id` is allocated by
//! SQLite `AUTOINCREMENT` and never reused, so the pair is a strict total order.
//!
//! The timestamp of a new commit is clamped to the branch's current head
//! ([`clamp_timestamp`]), which keeps timestamps non-decreasing along a branch
//! and makes every append strictly later than the pointer it replaces.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::types::CommitId;

// ---------------------------------------------------------------------------
// CommitOrder
// ---------------------------------------------------------------------------

/// Sort key of a commit within its branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitOrder {
    /// Microseconds since the Unix epoch.
    pub timestamp_us: i64,
    /// Tie-break.
    pub commit_id: CommitId,
}

impl CommitOrder {
    /// Build a key.
    #[must_use]
    pub const fn new(timestamp_us: i64, commit_id: CommitId) -> Self {
        Self {
            timestamp_us,
            commit_id,
        }
    }
}

impl PartialOrd for CommitOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CommitOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp_us
            .cmp(&other.timestamp_us)
            .then_with(|| self.commit_id.cmp(&other.commit_id))
    }
}

impl fmt::Display for CommitOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.commit_id, self.timestamp_us)
    }
}

// ---------------------------------------------------------------------------
// Clock helpers
// ---------------------------------------------------------------------------

/// Timestamp for a new commit given the branch head's timestamp.
///
/// Returns `max(now_us, head_us)`; never goes backwards along a branch.
#[must_use]
pub fn clamp_timestamp(now_us: i64, head_us: Option<i64>) -> i64 {
    head_us.map_or(now_us, |head| now_us.max(head))
}

/// Current wall clock in microseconds since the Unix epoch.
#[must_use]
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Convert a stored microsecond timestamp back to a `DateTime`.
///
/// Out-of-range values (which the store never writes) map to the epoch.
#[must_use]
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
