//! Commands over a branch's history and files: commit, log, tree, cat, history.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use forgehub::commit_log::{NewFile, append_commit, get_commit, list_commits};
use forgehub::model::{BranchName, CommitDetail, CommitId, CommitInfo, CommitSummary, FileName, FileRef, Snapshot};
use forgehub::snapshot::{read_file, resolve_as_of, resolve_history, resolve_latest};
use serde::Serialize;

use super::when;
use crate::context::{Context, RepoRef};
use crate::format::OutputFormat;

/// A file to upload: `PATH`, stored under the path as written, or
/// `NAME=PATH`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub name: FileName,
    pub path: PathBuf,
}

impl std::str::FromStr for Upload {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, path) = s.split_once('=').unwrap_or((s, s));
        if path.is_empty() {
            return Err(format!("missing path in '{s}'"));
        }
        Ok(Self {
            name: name.parse().map_err(|e| format!("{e}"))?,
            path: PathBuf::from(path),
        })
    }
}

impl Upload {
    fn read(&self) -> Result<NewFile> {
        let declared = std::fs::metadata(&self.path)
            .with_context(|| format!("Failed to stat {}", self.path.display()))?
            .len();
        let content = std::fs::read(&self.path).with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(NewFile::new(self.name.clone(), content).with_declared_size(declared))
    }
}

#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Repository as OWNER/NAME
    pub repo: RepoRef,

    /// Branch to append to
    pub branch: BranchName,

    /// Commit message
    #[arg(short, long)]
    pub message: String,

    /// Files to upload, as PATH or NAME=PATH. None makes an empty commit.
    pub files: Vec<Upload>,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Repository as OWNER/NAME
    pub repo: RepoRef,

    /// Branch to show
    pub branch: BranchName,

    /// Show at most this many commits
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Show one commit and the files it wrote
    #[arg(long, value_name = "COMMIT_ID")]
    pub commit: Option<i64>,
}

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Repository as OWNER/NAME
    pub repo: RepoRef,

    /// Branch to list
    pub branch: BranchName,

    /// List the files as they were right after this commit
    #[arg(long, value_name = "COMMIT_ID")]
    pub at: Option<i64>,
}

#[derive(Args, Debug)]
pub struct CatArgs {
    /// Repository as OWNER/NAME
    pub repo: RepoRef,

    /// Branch to read from
    pub branch: BranchName,

    /// File to print
    pub file: FileName,

    /// Print the version written by this commit
    #[arg(long, value_name = "COMMIT_ID")]
    pub at: Option<i64>,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Repository as OWNER/NAME
    pub repo: RepoRef,

    /// Branch to search
    pub branch: BranchName,

    /// File whose versions to list
    pub file: FileName,
}

fn commit_line(c: &CommitInfo) -> String {
    format!("{:>6}  {}  {:<16} {}", c.id, when(&c.timestamp), c.author, c.message)
}

fn file_line(f: &FileRef) -> String {
    format!("{:>10}  {:>6}  {}", f.size, f.commit.id, f.file_name)
}

pub fn commit(ctx: &mut Context, args: CommitArgs) -> Result<()> {
    let author = ctx.actor()?;
    let repo = ctx.repo(&args.repo)?;
    let files = args.files.iter().map(Upload::read).collect::<Result<Vec<_>>>()?;
    if files.is_empty() {
        tracing::info!("committing without files");
    }
    let info = ctx
        .write(|store| append_commit(store, repo.id, &args.branch, author.id, &args.message, &files))
        .with_context(|| format!("Failed to commit to {}:{}", args.repo, args.branch))?;
    ctx.format.emit(&info, |c| {
        format!("[{} {}] {} ({} file(s))", args.branch, c.id, c.message, files.len())
    })
}

pub fn log(ctx: &mut Context, args: LogArgs) -> Result<()> {
    let repo = ctx.repo(&args.repo)?;
    if let Some(id) = args.commit {
        let detail: CommitDetail = get_commit(ctx.store(), repo.id, &args.branch, CommitId(id))?;
        return ctx.format.emit(&detail, |d| {
            let mut out = commit_line(&d.commit);
            for f in &d.files {
                out.push_str(&format!("\n  {:>10}  {}", f.size, f.file_name));
            }
            out
        });
    }
    let commits: Vec<CommitSummary> = list_commits(ctx.store(), repo.id, &args.branch, args.limit)?;
    ctx.format.emit(&commits, |commits| {
        commits
            .iter()
            .map(|s| format!("{}  ({} file(s))", commit_line(&s.commit), s.file_count))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub fn tree(ctx: &mut Context, args: TreeArgs) -> Result<()> {
    let repo = ctx.repo(&args.repo)?;
    let snapshot: Snapshot = match args.at {
        Some(id) => resolve_as_of(ctx.store(), repo.id, &args.branch, CommitId(id))?,
        None => resolve_latest(ctx.store(), repo.id, &args.branch)?,
    };
    ctx.format.emit(&snapshot, |s| {
        if s.is_empty() {
            return format!("{} has no files", args.branch);
        }
        s.files.values().map(file_line).collect::<Vec<_>>().join("\n")
    })
}

#[derive(Serialize)]
struct CatOutput<'a> {
    #[serde(flatten)]
    file: &'a FileRef,
    /// Lossy for non-UTF-8 content; text mode writes the raw bytes.
    content: String,
}

pub fn cat(ctx: &mut Context, args: CatArgs) -> Result<()> {
    let repo = ctx.repo(&args.repo)?;
    let file = read_file(ctx.store(), repo.id, &args.branch, &args.file, args.at.map(CommitId))?;
    match ctx.format {
        OutputFormat::Text => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&file.content).context("Failed to write to stdout")?;
            stdout.flush().context("Failed to write to stdout")?;
            Ok(())
        }
        OutputFormat::Json => {
            let out = CatOutput {
                file: &file.file,
                content: String::from_utf8_lossy(&file.content).into_owned(),
            };
            println!("{}", ctx.format.serialize(&out)?);
            Ok(())
        }
    }
}

pub fn history(ctx: &mut Context, args: HistoryArgs) -> Result<()> {
    let repo = ctx.repo(&args.repo)?;
    let commits = resolve_history(ctx.store(), repo.id, &args.branch, &args.file)?;
    if commits.is_empty() && ctx.format == OutputFormat::Text {
        bail!("'{}' was never written on {}", args.file, args.branch);
    }
    ctx.format
        .emit(&commits, |c| c.iter().map(commit_line).collect::<Vec<_>>().join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_spec_defaults_name_to_path() {
        let u: Upload = "docs/intro.md".parse().unwrap();
        assert_eq!(u.name.as_str(), "docs/intro.md");
        assert_eq!(u.path, PathBuf::from("docs/intro.md"));
    }

    #[test]
    fn upload_spec_with_explicit_name() {
        let u: Upload = "README.md=/tmp/readme.txt".parse().unwrap();
        assert_eq!(u.name.as_str(), "README.md");
        assert_eq!(u.path, PathBuf::from("/tmp/readme.txt"));
        assert!("README.md=".parse::<Upload>().is_err());
    }

    #[test]
    fn upload_reads_bytes_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [0u8, 1, 2, 255]).unwrap();
        let upload = Upload {
            name: "blob.bin".parse().unwrap(),
            path,
        };
        let file = upload.read().unwrap();
        assert_eq!(file.content, vec![0u8, 1, 2, 255]);
        assert_eq!(file.declared_size, Some(4));
    }
}
