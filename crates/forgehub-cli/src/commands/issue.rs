use anyhow::{Context as _, Result, bail};
use clap::Subcommand;
use forgehub::issues::{IssuePatch, NewIssue, ReassignRule, create_issue, get_issue, list_issues, update_issue_with};
use forgehub::model::{Issue, IssueId, IssueStatus, Username};

use super::when;
use crate::context::{Context, RepoRef};

#[derive(Subcommand, Debug)]
pub enum IssueCommands {
    /// Open an issue
    Create {
        /// Repository as OWNER/NAME
        repo: RepoRef,

        /// Short summary
        #[arg(long)]
        title: String,

        /// Longer explanation
        #[arg(long, default_value = "")]
        description: String,

        /// User to assign
        #[arg(long)]
        assignee: Option<Username>,
    },

    /// List issues, newest first
    List {
        /// Repository as OWNER/NAME
        repo: RepoRef,

        /// Only issues in this state: open or closed
        #[arg(long)]
        status: Option<IssueStatus>,
    },

    /// Show one issue
    Show {
        /// Issue id
        id: i64,
    },

    /// Edit an issue (creator or assignee; only the creator may reassign)
    Update {
        /// Issue id
        id: i64,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// open or closed
        #[arg(long)]
        status: Option<IssueStatus>,

        /// Assign to this user
        #[arg(long, conflicts_with = "unassign")]
        assignee: Option<Username>,

        /// Remove the assignee
        #[arg(long)]
        unassign: bool,
    },
}

fn render(issue: &Issue) -> String {
    let assignee = issue
        .assignee_id
        .map_or_else(|| "unassigned".to_owned(), |a| format!("assigned to user #{a}"));
    let mut out = format!(
        "#{:<5} [{}] {}  (by user #{}, {}, updated {})",
        issue.id,
        issue.status,
        issue.title,
        issue.creator_id,
        assignee,
        when(&issue.updated_at)
    );
    if !issue.description.is_empty() {
        out.push_str(&format!("\n  {}", issue.description));
    }
    out
}

pub fn run(ctx: &mut Context, cmd: IssueCommands) -> Result<()> {
    match cmd {
        IssueCommands::Create {
            repo,
            title,
            description,
            assignee,
        } => {
            let creator = ctx.actor()?;
            let id = ctx.repo(&repo)?.id;
            let assignee = assignee.map(|name| ctx.user(&name)).transpose()?.map(|u| u.id);
            let new = NewIssue {
                title,
                description,
                assignee,
            };
            let issue = ctx
                .write(|store| create_issue(store, id, creator.id, &new))
                .with_context(|| format!("Failed to open an issue in {repo}"))?;
            ctx.format.emit(&issue, |i| format!("Opened {}", render(i)))
        }
        IssueCommands::List { repo, status } => {
            let id = ctx.repo(&repo)?.id;
            let issues = list_issues(ctx.store(), id, status)?;
            ctx.format
                .emit(&issues, |issues| issues.iter().map(render).collect::<Vec<_>>().join("\n"))
        }
        IssueCommands::Show { id } => {
            let issue = get_issue(ctx.store(), IssueId(id))?;
            ctx.format.emit(&issue, render)
        }
        IssueCommands::Update {
            id,
            title,
            description,
            status,
            assignee,
            unassign,
        } => {
            let actor = ctx.actor()?;
            let id = IssueId(id);
            let assignee = match (assignee, unassign) {
                (Some(name), _) => Some(Some(ctx.user(&name)?.id)),
                (None, true) => Some(None),
                (None, false) => None,
            };
            let patch = IssuePatch {
                title,
                description,
                status,
                assignee,
            };
            if patch.is_empty() {
                bail!("Nothing to update: pass --title, --description, --status, --assignee or --unassign");
            }
            let issue = ctx
                .write(|store| update_issue_with(store, id, actor.id, &patch, ReassignRule::CreatorOnly))
                .with_context(|| format!("Failed to update issue #{id}"))?;
            ctx.format.emit(&issue, |i| format!("Updated {}", render(i)))
        }
    }
}
