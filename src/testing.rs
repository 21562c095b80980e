//! Shared fixture for unit tests: an in-memory store holding `alice/proj`.

use forgehub_db::Store;

use crate::commit_log::{NewFile, append_commit};
use crate::config::{AccountsConfig, RepositoryConfig};
use crate::fork::fork_branch;
use crate::model::{Branch, BranchName, CommitInfo, FileName, Repository, User, UserId, Username};
use crate::repos::{NewRepository, create_repository};
use crate::users::create_user;

pub(crate) struct Fixture {
    pub store: Store,
    pub alice: User,
    pub repo: Repository,
}

impl Fixture {
    /// `alice` owning `alice/proj`, whose `main` holds the generated README.
    pub fn new() -> Self {
        let mut store = Store::open_in_memory().unwrap();
        let alice = create_user(
            &mut store,
            &AccountsConfig::default(),
            &Username::new("alice").unwrap(),
            "alice@example.com",
        )
        .unwrap();
        let repo = create_repository(
            &mut store,
            &RepositoryConfig::default(),
            alice.id,
            &NewRepository::new("proj".parse().unwrap()),
        )
        .unwrap();
        Self { store, alice, repo }
    }

    pub fn main(&self) -> BranchName {
        BranchName::new("main").unwrap()
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

    pub fn commit(&mut self, branch: &BranchName, author: UserId, files: &[(&str, &str)]) -> CommitInfo {
        let files: Vec<_> = files
            .iter()
            .map(|(name, content)| NewFile::new(FileName::new(name).unwrap(), content.as_bytes().to_vec()))
            .collect();
        append_commit(&mut self.store, self.repo.id, branch, author, "change", &files).unwrap()
    }

    pub fn commit_bytes(&mut self, branch: &BranchName, author: UserId, name: &str, content: Vec<u8>) -> CommitInfo {
        let files = [NewFile::new(FileName::new(name).unwrap(), content)];
        append_commit(&mut self.store, self.repo.id, branch, author, "binary", &files).unwrap()
    }

    pub fn fork(&mut self, base: &BranchName, name: &str, creator: UserId) -> Branch {
        fork_branch(&mut self.store, self.repo.id, base, &name.parse().unwrap(), creator).unwrap()
    }

    pub fn branch(&mut self, name: &BranchName) -> Branch {
        crate::branches::get_branch(&mut self.store, self.repo.id, name).unwrap().branch
    }

    pub fn branch_head(&mut self, name: &BranchName) -> CommitInfo {
        crate::branches::get_branch(&mut self.store, self.repo.id, name).unwrap().last_commit
    }
}
