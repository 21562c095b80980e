//! State shared by every command: the open store, the loaded config and the
//! acting user named by `--as`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context as _, Result, bail};
use forgehub::model::{RepoName, Repository, User, Username};
use forgehub::repos::get_repository;
use forgehub::retry::{RetryPolicy, with_retry};
use forgehub::users::find_user;
use forgehub::{CoreError, ForgeConfig, Store};

use crate::format::OutputFormat;

/// A repository addressed as `owner/name` on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: Username,
    pub name: RepoName,
}

impl FromStr for RepoRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((owner, name)) = s.split_once('/') else {
            return Err(format!("expected OWNER/NAME, got '{s}'"));
        };
        Ok(Self {
            owner: owner.parse().map_err(|e| format!("{e}"))?,
            name: name.parse().map_err(|e| format!("{e}"))?,
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

pub struct Context {
    store: Store,
    config: ForgeConfig,
    actor: Option<Username>,
    pub format: OutputFormat,
}

impl Context {
    /// Load the config file, apply `--db`, and open the store.
    pub fn open(config_path: &Path, db: Option<PathBuf>, actor: Option<Username>, format: OutputFormat) -> Result<Self> {
        let mut config = ForgeConfig::load(config_path).context("Failed to load configuration")?;
        if let Some(db) = db {
            config.store.path = db;
        }
        let store = Store::open(&config.store.path, &config.store.options())
            .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?;
        tracing::debug!(path = %config.store.path.display(), "store opened");
        Ok(Self {
            store,
            config,
            actor,
            format,
        })
    }

    pub const fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn store(&mut self) -> &mut Store {
        &mut self.store
    }

    /// The user named by `--as`.
    pub fn actor(&mut self) -> Result<User> {
        let Some(name) = self.actor.clone() else {
            bail!("This command acts as a user: pass --as <USERNAME> or set FORGEHUB_USER");
        };
        find_user(&mut self.store, &name).with_context(|| format!("Unknown acting user '{name}'"))
    }

    pub fn user(&mut self, name: &Username) -> Result<User> {
        Ok(find_user(&mut self.store, name)?)
    }

    pub fn repo(&mut self, repo: &RepoRef) -> Result<Repository> {
        Ok(get_repository(&mut self.store, &repo.owner, &repo.name)?)
    }

    /// Run a mutating operation, re-issuing it while it fails as retryable.
    pub fn write<T, F>(&mut self, mut op: F) -> Result<T, CoreError>
    where
        F: FnMut(&mut Store) -> Result<T, CoreError>,
    {
        let policy = RetryPolicy::from(&self.config.retry);
        let store = &mut self.store;
        with_retry(policy, || op(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_ref_parses_owner_and_name() {
        let r: RepoRef = "alice/proj".parse().unwrap();
        assert_eq!(r.owner.as_str(), "alice");
        assert_eq!(r.name.as_str(), "proj");
        assert_eq!(r.to_string(), "alice/proj");
    }

    #[test]
    fn repo_ref_rejects_malformed() {
        assert!("proj".parse::<RepoRef>().is_err());
        assert!("/proj".parse::<RepoRef>().is_err());
        assert!("alice/..".parse::<RepoRef>().is_err());
    }

    #[test]
    fn open_creates_store_and_honors_db_override() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("forge.db");
        let mut ctx = Context::open(&dir.path().join("missing.toml"), Some(db.clone()), None, OutputFormat::Text).unwrap();
        assert!(db.exists());
        assert_eq!(ctx.config().store.path, db);
        assert!(ctx.actor().is_err());
    }
}
