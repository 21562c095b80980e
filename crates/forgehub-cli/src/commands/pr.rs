use anyhow::{Context as _, Result};
use clap::Subcommand;
use forgehub::model::{BranchName, PullRequestId, PullRequestSummary, Review};
use forgehub::pulls::{NewPullRequest, add_review, create_pull_request, get_pull_request, list_pull_requests, list_reviews};
use serde::Serialize;

use super::when;
use crate::context::{Context, RepoRef};

#[derive(Subcommand, Debug)]
pub enum PrCommands {
    /// Propose merging TARGET into BASE
    Create {
        /// Repository as OWNER/NAME
        repo: RepoRef,

        /// Branch the changes go into
        #[arg(long)]
        base: BranchName,

        /// Branch carrying the changes
        #[arg(long)]
        target: BranchName,

        /// Short summary
        #[arg(long)]
        title: String,

        /// Longer explanation
        #[arg(long, default_value = "")]
        description: String,
    },

    /// List pull requests, newest first
    List {
        /// Repository as OWNER/NAME
        repo: RepoRef,
    },

    /// Show a pull request and its reviews
    Show {
        /// Pull request id
        id: i64,
    },

    /// Review a pull request, replacing your earlier review
    Review {
        /// Pull request id
        id: i64,

        /// Review comment
        #[arg(short, long)]
        message: String,
    },
}

fn render(s: &PullRequestSummary) -> String {
    let pr = &s.pull_request;
    format!(
        "#{:<5} [{}] {}  ({} -> {}, by {}, {})",
        pr.id,
        pr.status,
        pr.title,
        s.target_branch,
        s.base_branch,
        s.creator,
        when(&pr.created_at)
    )
}

fn render_review(r: &Review) -> String {
    format!("  {} ({}): {}", r.reviewer, when(&r.updated_at), r.comment)
}

#[derive(Serialize)]
struct PullRequestView {
    #[serde(flatten)]
    summary: PullRequestSummary,
    reviews: Vec<Review>,
}

pub fn run(ctx: &mut Context, cmd: PrCommands) -> Result<()> {
    match cmd {
        PrCommands::Create {
            repo,
            base,
            target,
            title,
            description,
        } => {
            let creator = ctx.actor()?;
            let id = ctx.repo(&repo)?.id;
            let new = NewPullRequest {
                description,
                ..NewPullRequest::new(base, target, title)
            };
            let pr = ctx
                .write(|store| create_pull_request(store, id, creator.id, &new))
                .with_context(|| format!("Failed to open a pull request in {repo}"))?;
            ctx.format.emit(&pr, |p| format!("Opened {}", render(p)))
        }
        PrCommands::List { repo } => {
            let id = ctx.repo(&repo)?.id;
            let prs = list_pull_requests(ctx.store(), id)?;
            ctx.format
                .emit(&prs, |prs| prs.iter().map(render).collect::<Vec<_>>().join("\n"))
        }
        PrCommands::Show { id } => {
            let id = PullRequestId(id);
            let view = PullRequestView {
                summary: get_pull_request(ctx.store(), id)?,
                reviews: list_reviews(ctx.store(), id)?,
            };
            ctx.format.emit(&view, |v| {
                let mut out = render(&v.summary);
                if !v.summary.pull_request.description.is_empty() {
                    out.push_str(&format!("\n\n{}\n", v.summary.pull_request.description));
                }
                for review in &v.reviews {
                    out.push('\n');
                    out.push_str(&render_review(review));
                }
                out
            })
        }
        PrCommands::Review { id, message } => {
            let reviewer = ctx.actor()?;
            let id = PullRequestId(id);
            let review = ctx
                .write(|store| add_review(store, id, reviewer.id, &message))
                .with_context(|| format!("Failed to review pull request #{id}"))?;
            ctx.format.emit(&review, |r| format!("Reviewed #{}\n{}", r.pr_id, render_review(r)))
        }
    }
}
