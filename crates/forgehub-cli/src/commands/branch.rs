use anyhow::{Context as _, Result};
use clap::Subcommand;
use forgehub::branches::{delete_branch, get_branch, list_branches};
use forgehub::fork::fork_branch;
use forgehub::model::{BranchName, BranchSummary};
use serde::Serialize;

use super::when;
use crate::context::{Context, RepoRef};

#[derive(Subcommand, Debug)]
pub enum BranchCommands {
    /// List branches with their last commit
    List {
        /// Repository as OWNER/NAME
        repo: RepoRef,
    },

    /// Create a branch holding a copy of another branch's current files
    Fork {
        /// Repository as OWNER/NAME
        repo: RepoRef,

        /// Branch to copy from
        base: BranchName,

        /// Name of the new branch
        name: BranchName,
    },

    /// Delete a branch and its history (admins only)
    Delete {
        /// Repository as OWNER/NAME
        repo: RepoRef,

        /// Branch to delete
        name: BranchName,
    },
}

fn render(summary: &BranchSummary) -> String {
    let mut line = format!(
        "{:<24} {}  {} by {}  \"{}\"",
        summary.branch.name,
        summary.last_commit.id,
        when(&summary.last_commit.timestamp),
        summary.last_commit.author,
        summary.last_commit.message,
    );
    if let Some(parent) = &summary.parent {
        line.push_str(&format!("  (from {parent}, created by {})", summary.creator));
    }
    line
}

#[derive(Serialize)]
struct Deleted<'a> {
    repo: String,
    deleted: &'a BranchName,
}

pub fn run(ctx: &mut Context, cmd: BranchCommands) -> Result<()> {
    match cmd {
        BranchCommands::List { repo } => {
            let id = ctx.repo(&repo)?.id;
            let branches = list_branches(ctx.store(), id)?;
            ctx.format
                .emit(&branches, |b| b.iter().map(render).collect::<Vec<_>>().join("\n"))
        }
        BranchCommands::Fork { repo, base, name } => {
            let creator = ctx.actor()?;
            let id = ctx.repo(&repo)?.id;
            ctx.write(|store| fork_branch(store, id, &base, &name, creator.id))
                .with_context(|| format!("Failed to fork '{base}' into '{name}' in {repo}"))?;
            let summary = get_branch(ctx.store(), id, &name)?;
            ctx.format.emit(&summary, |s| format!("Forked {base} -> {}", render(s)))
        }
        BranchCommands::Delete { repo, name } => {
            let actor = ctx.actor()?;
            let id = ctx.repo(&repo)?.id;
            ctx.write(|store| delete_branch(store, id, &name, actor.id))
                .with_context(|| format!("Failed to delete branch '{name}' in {repo}"))?;
            let out = Deleted {
                repo: repo.to_string(),
                deleted: &name,
            };
            ctx.format.emit(&out, |d| format!("Deleted branch {} in {}", d.deleted, d.repo))
        }
    }
}
