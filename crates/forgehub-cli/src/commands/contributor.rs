use anyhow::{Context as _, Result};
use clap::Subcommand;
use forgehub::contributors::{add_contributor, list_contributors, set_role};
use forgehub::model::{Contributor, Role, Username};

use crate::context::{Context, RepoRef};

#[derive(Subcommand, Debug)]
pub enum ContributorCommands {
    /// List members and their roles
    List {
        /// Repository as OWNER/NAME
        repo: RepoRef,
    },

    /// Grant a user membership (admins only)
    Add {
        /// Repository as OWNER/NAME
        repo: RepoRef,

        /// User to add
        user: Username,

        /// contributor or admin
        #[arg(long, default_value = "contributor")]
        role: Role,
    },

    /// Change a member's role (admins only)
    Role {
        /// Repository as OWNER/NAME
        repo: RepoRef,

        /// Member to change
        user: Username,

        /// contributor or admin
        role: Role,
    },
}

fn render(c: &Contributor) -> String {
    format!("{:<20} {}", c.username, c.role)
}

pub fn run(ctx: &mut Context, cmd: ContributorCommands) -> Result<()> {
    match cmd {
        ContributorCommands::List { repo } => {
            let id = ctx.repo(&repo)?.id;
            let members = list_contributors(ctx.store(), id)?;
            ctx.format
                .emit(&members, |m| m.iter().map(render).collect::<Vec<_>>().join("\n"))
        }
        ContributorCommands::Add { repo, user, role } => {
            let actor = ctx.actor()?;
            let id = ctx.repo(&repo)?.id;
            let user_id = ctx.user(&user)?.id;
            let member = ctx
                .write(|store| add_contributor(store, id, actor.id, user_id, role))
                .with_context(|| format!("Failed to add '{user}' to {repo}"))?;
            ctx.format.emit(&member, |m| format!("Added {}", render(m)))
        }
        ContributorCommands::Role { repo, user, role } => {
            let actor = ctx.actor()?;
            let id = ctx.repo(&repo)?.id;
            let user_id = ctx.user(&user)?.id;
            let member = ctx
                .write(|store| set_role(store, id, actor.id, user_id, role))
                .with_context(|| format!("Failed to change the role of '{user}' in {repo}"))?;
            ctx.format.emit(&member, |m| format!("Set {}", render(m)))
        }
    }
}
