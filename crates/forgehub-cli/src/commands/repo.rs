use anyhow::{Context as _, Result, bail};
use clap::Subcommand;
use forgehub::model::{RepoName, Repository, Username, Visibility};
use forgehub::repos::{NewRepository, RepositoryPatch, create_repository, list_repositories, update_repository};

use super::when;
use crate::context::{Context, RepoRef};

#[derive(Subcommand, Debug)]
pub enum RepoCommands {
    /// Create a repository owned by the acting user
    Create {
        /// Repository name
        name: RepoName,

        /// One-line description
        #[arg(long, default_value = "")]
        description: String,

        /// Hide the repository from other users
        #[arg(long)]
        private: bool,

        /// Start with an empty initial commit instead of a generated README.md
        #[arg(long)]
        no_readme: bool,
    },

    /// List the repositories of a user (default: the acting user)
    List {
        /// Owner to list
        owner: Option<Username>,
    },

    /// Show one repository
    Show {
        /// Repository as OWNER/NAME
        repo: RepoRef,
    },

    /// Change description or visibility (admins only)
    Update {
        /// Repository as OWNER/NAME
        repo: RepoRef,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New visibility: public or private
        #[arg(long)]
        visibility: Option<Visibility>,
    },
}

fn render(repo: &Repository) -> String {
    let mut out = format!("{} [{}]", repo.full_name(), repo.visibility);
    if !repo.description.is_empty() {
        out.push_str(&format!("\n  {}", repo.description));
    }
    out.push_str(&format!("\n  created {}", when(&repo.created_at)));
    out
}

pub fn run(ctx: &mut Context, cmd: RepoCommands) -> Result<()> {
    match cmd {
        RepoCommands::Create {
            name,
            description,
            private,
            no_readme,
        } => {
            let owner = ctx.actor()?;
            let defaults = ctx.config().repository.clone();
            let new = NewRepository {
                description,
                visibility: if private { Visibility::Private } else { Visibility::Public },
                init_readme: no_readme.then_some(false),
                ..NewRepository::new(name)
            };
            let repo = ctx
                .write(|store| create_repository(store, &defaults, owner.id, &new))
                .with_context(|| format!("Failed to create repository '{}/{}'", owner.username, new.name))?;
            ctx.format.emit(&repo, |r| format!("Created {}", render(r)))
        }
        RepoCommands::List { owner } => {
            let owner = match owner {
                Some(owner) => owner,
                None => ctx.actor()?.username,
            };
            let repos = list_repositories(ctx.store(), &owner)?;
            ctx.format.emit(&repos, |repos| {
                if repos.is_empty() {
                    return format!("{owner} has no repositories");
                }
                repos.iter().map(render).collect::<Vec<_>>().join("\n")
            })
        }
        RepoCommands::Show { repo } => {
            let repo = ctx.repo(&repo)?;
            ctx.format.emit(&repo, render)
        }
        RepoCommands::Update {
            repo,
            description,
            visibility,
        } => {
            let patch = RepositoryPatch { description, visibility };
            if patch.is_empty() {
                bail!("Nothing to update: pass --description and/or --visibility");
            }
            let actor = ctx.actor()?;
            let id = ctx.repo(&repo)?.id;
            let updated = ctx
                .write(|store| update_repository(store, id, actor.id, &patch))
                .with_context(|| format!("Failed to update {repo}"))?;
            ctx.format.emit(&updated, |r| format!("Updated {}", render(r)))
        }
    }
}
