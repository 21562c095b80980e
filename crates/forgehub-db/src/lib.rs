//! Storage layer for forgehub.
//!
//! This crate owns everything that touches SQLite directly: opening and
//! configuring connections, the relational schema and its migrations, and the
//! two transaction scopes every core operation runs in. The core crate writes
//! its own queries against the [`rusqlite::Transaction`] handed to it, but
//! never opens connections or begins transactions itself.
//!
//! # Crate layout
//!
//! - [`store`]: the [`Store`] handle, [`StoreOptions`], `read` / `write` scopes.
//! - [`schema`]: table definitions and [`schema::migrate`].
//! - [`error`]: the [`DbError`] enum.

pub mod error;
pub mod schema;
pub mod store;

pub use error::DbError;
pub use store::{Store, StoreOptions, Synchronous};
