//! Shared helpers for forgehub integration tests.
//!
//! Every test gets its own on-disk database in a temp directory, so extra
//! handles can be opened on the same file from other threads.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use forgehub::commit_log::{NewFile, append_commit};
use forgehub::config::{AccountsConfig, RepositoryConfig};
use forgehub::model::{BranchName, CommitId, CommitInfo, FileName, RepoName, Repository, User, Username};
use forgehub::repos::{NewRepository, create_repository};
use forgehub::snapshot::{read_file, resolve_as_of, resolve_latest};
use forgehub::users::create_user;
use forgehub::{Store, StoreOptions};
use forgehub_db::Synchronous;
use tempfile::TempDir;

pub struct TestForge {
    _dir: TempDir,
    pub path: PathBuf,
    pub store: Store,
}

fn options() -> StoreOptions {
    StoreOptions {
        busy_timeout: Duration::from_secs(30),
        synchronous: Synchronous::Normal,
    }
}

impl TestForge {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("forgehub.db");
        let store = Store::open(&path, &options()).expect("failed to open store");
        Self { _dir: dir, path, store }
    }

    /// Another connection to the same database.
    pub fn open(&self) -> Store {
        open_store(&self.path)
    }

    /// Another connection that gives up on the write lock after `busy_timeout`.
    pub fn open_with_timeout(&self, busy_timeout: Duration) -> Store {
        let options = StoreOptions {
            busy_timeout,
            ..options()
        };
        Store::open(&self.path, &options).expect("failed to open store")
    }

    pub fn user(&mut self, name: &str) -> User {
        create_user(
            &mut self.store,
            &AccountsConfig::default(),
            &Username::new(name).unwrap(),
            &format!("{name}@example.com"),
        )
        .unwrap()
    }

    /// A repository whose default branch starts with an empty initial commit.
    pub fn empty_repo(&mut self, owner: &User, name: &str) -> Repository {
        let new = NewRepository {
            init_readme: Some(false),
            ..NewRepository::new(RepoName::new(name).unwrap())
        };
        create_repository(&mut self.store, &RepositoryConfig::default(), owner.id, &new).unwrap()
    }

    pub fn commit(&mut self, repo: &Repository, branch: &str, author: &User, files: &[(&str, &[u8])]) -> CommitInfo {
        append_commit(&mut self.store, repo.id, &branch_name(branch), author.id, "update", &new_files(files)).unwrap()
    }

    pub fn contents(&mut self, repo: &Repository, branch: &str) -> BTreeMap<String, Vec<u8>> {
        contents(&mut self.store, repo, branch, None)
    }
}

pub fn open_store(path: &Path) -> Store {
    Store::open(path, &options()).expect("failed to open store")
}

pub fn branch_name(name: &str) -> BranchName {
    BranchName::new(name).unwrap()
}

pub fn new_files(files: &[(&str, &[u8])]) -> Vec<NewFile> {
    files
        .iter()
        .map(|(name, content)| NewFile::new(FileName::new(name).unwrap(), content.to_vec()))
        .collect()
}

/// Name → bytes of a branch's resolved files, at the head or as of a commit.
pub fn contents(store: &mut Store, repo: &Repository, branch: &str, as_of: Option<CommitId>) -> BTreeMap<String, Vec<u8>> {
    let branch = branch_name(branch);
    let snapshot = match as_of {
        Some(commit) => resolve_as_of(store, repo.id, &branch, commit).unwrap(),
        None => resolve_latest(store, repo.id, &branch).unwrap(),
    };
    snapshot
        .files
        .values()
        .map(|f| {
            let file = read_file(store, repo.id, &branch, &f.file_name, Some(f.commit.id)).unwrap();
            (f.file_name.to_string(), file.content)
        })
        .collect()
}
