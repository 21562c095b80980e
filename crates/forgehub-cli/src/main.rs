use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use forgehub::model::Username;

mod commands;
mod context;
mod format;
mod telemetry;

use commands::branch::BranchCommands;
use commands::contributor::ContributorCommands;
use commands::files::{CatArgs, CommitArgs, HistoryArgs, LogArgs, TreeArgs};
use commands::issue::IssueCommands;
use commands::pr::PrCommands;
use commands::repo::RepoCommands;
use commands::user::UserCommands;
use context::Context;
use format::OutputFormat;
use telemetry::LogFormat;

/// forgehub - versioned file snapshots for collaborative repositories
///
/// Every branch is an append-only list of commits; its files are resolved
/// from that history on demand. Forking a branch copies its current files
/// into a new, independent branch.
#[derive(Parser)]
#[command(name = "forgehub")]
#[command(version, about, propagate_version = true)]
#[command(after_help = "\
QUICK START:
  forgehub user add alice --email alice@example.com
  forgehub --as alice repo create proj
  forgehub --as alice commit alice/proj main -m \"notes\" NOTES.md
  forgehub --as alice branch fork alice/proj main feature
  forgehub tree alice/proj feature")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "FORGEHUB_CONFIG", default_value = "forgehub.toml")]
    config: PathBuf,

    /// Database path (overrides store.path)
    #[arg(long, global = true, env = "FORGEHUB_DB")]
    db: Option<PathBuf>,

    /// Act as this user
    #[arg(long = "as", global = true, env = "FORGEHUB_USER", value_name = "USERNAME")]
    actor: Option<Username>,

    /// Output format: text or json
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Log line format on stderr
    #[arg(long, global = true, env = "FORGEHUB_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user accounts
    #[command(subcommand)]
    User(UserCommands),

    /// Create, list, inspect and configure repositories
    #[command(subcommand)]
    Repo(RepoCommands),

    /// List, fork and delete branches
    #[command(subcommand)]
    Branch(BranchCommands),

    /// Append a commit of local files to a branch
    Commit(CommitArgs),

    /// Show the commits of a branch, newest first
    Log(LogArgs),

    /// List the current files of a branch
    Tree(TreeArgs),

    /// Print the content of a file
    Cat(CatArgs),

    /// Show the commits that wrote a file, newest first
    History(HistoryArgs),

    /// Manage repository membership
    #[command(subcommand)]
    Contributor(ContributorCommands),

    /// Pull requests and reviews
    #[command(subcommand)]
    Pr(PrCommands),

    /// Issue tracking
    #[command(subcommand)]
    Issue(IssueCommands),

    /// Generate shell completions
    Completions {
        /// Shell to generate for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry = telemetry::init(cli.log_format);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "forgehub", &mut std::io::stdout());
        return Ok(());
    }

    let mut ctx = Context::open(&cli.config, cli.db, cli.actor, cli.format)?;
    run(&mut ctx, cli.command)
}

fn run(ctx: &mut Context, command: Commands) -> Result<()> {
    match command {
        Commands::User(cmd) => commands::user::run(ctx, cmd),
        Commands::Repo(cmd) => commands::repo::run(ctx, cmd),
        Commands::Branch(cmd) => commands::branch::run(ctx, cmd),
        Commands::Commit(args) => commands::files::commit(ctx, args),
        Commands::Log(args) => commands::files::log(ctx, args),
        Commands::Tree(args) => commands::files::tree(ctx, args),
        Commands::Cat(args) => commands::files::cat(ctx, args),
        Commands::History(args) => commands::files::history(ctx, args),
        Commands::Contributor(cmd) => commands::contributor::run(ctx, cmd),
        Commands::Pr(cmd) => commands::pr::run(ctx, cmd),
        Commands::Issue(cmd) => commands::issue::run(ctx, cmd),
        Commands::Completions { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("forgehub").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = parse(&["repo", "show", "alice/proj", "--as", "bob", "--format", "json", "--db", "x.db"]);
        assert_eq!(cli.actor.unwrap().as_str(), "bob");
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        assert!(matches!(cli.command, Commands::Repo(RepoCommands::Show { .. })));
    }

    #[test]
    fn commit_collects_uploads() {
        let cli = parse(&["commit", "alice/proj", "main", "-m", "msg", "a.txt", "README.md=docs/readme.txt"]);
        let Commands::Commit(args) = cli.command else {
            panic!("expected commit");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.files[1].name.as_str(), "README.md");
    }

    #[test]
    fn invalid_names_are_rejected_at_parse_time() {
        let bad = |args: &[&str]| Cli::try_parse_from(std::iter::once("forgehub").chain(args.iter().copied())).is_err();
        assert!(bad(&["branch", "fork", "alice/proj", "main", "a..b"]));
        assert!(bad(&["repo", "show", "no-slash"]));
        assert!(bad(&["contributor", "role", "alice/proj", "bob", "owner"]));
        assert!(bad(&["issue", "update", "1", "--assignee", "bob", "--unassign"]));
    }

    #[test]
    fn issue_update_flags() {
        let cli = parse(&["issue", "update", "7", "--status", "closed", "--unassign"]);
        let Commands::Issue(IssueCommands::Update { id, status, unassign, .. }) = cli.command else {
            panic!("expected issue update");
        };
        assert_eq!(id, 7);
        assert_eq!(status, Some(forgehub::model::IssueStatus::Closed));
        assert!(unassign);
    }
}
