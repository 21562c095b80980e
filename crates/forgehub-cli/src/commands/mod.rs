//! Subcommand definitions and their handlers.

pub mod branch;
pub mod contributor;
pub mod files;
pub mod issue;
pub mod pr;
pub mod repo;
pub mod user;

use chrono::{DateTime, Utc};

/// Timestamps as printed in text output.
pub(crate) fn when(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
