//! forgehub: a versioned file-snapshot store for collaborative repositories.
//!
//! A repository's files live as an append-only history of commits per branch.
//! The current tree of a branch is resolved from that history on demand, and
//! a new branch is forked by copying another branch's resolved snapshot into
//! a commit of its own.
//!
//! Every operation takes an explicit [`forgehub_db::Store`] and runs in one
//! transaction on it: reads in a snapshot transaction, writes holding the
//! database write lock. The `forgehub` binary in `crates/forgehub-cli` is a
//! thin front-end over these functions.
//!
//! | Module | Concern |
//! |---|---|
//! | [`commit_log`] | append commits, list and inspect history |
//! | [`snapshot`] | resolve the latest / as-of tree, file history, content |
//! | [`fork`] | materialize a new branch from another |
//! | [`branches`] | list, inspect and delete branches |
//! | [`contributors`] | membership and roles |
//! | [`pulls`] | pull requests and reviews |
//! | [`issues`] | issue workflow |
//! | [`users`], [`repos`] | identities and repositories |

pub mod branches;
pub mod commit_log;
pub mod config;
pub mod contributors;
pub mod error;
pub mod fork;
pub mod issues;
pub mod model;
pub mod pulls;
pub mod repos;
pub mod retry;
pub mod snapshot;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ForgeConfig;
pub use error::{CoreError, ErrorClass};
pub use forgehub_db::{Store, StoreOptions};
