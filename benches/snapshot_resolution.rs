//! Snapshot resolution and fork benchmarks.
//!
//! Measures resolving the latest tree of a branch and forking it, for
//! branches whose history touches many distinct files.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench snapshot_resolution
//! # With a custom filter:
//! cargo bench --bench snapshot_resolution -- fork
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use forgehub::commit_log::{NewFile, append_commit};
use forgehub::config::{AccountsConfig, RepositoryConfig};
use forgehub::fork::fork_branch;
use forgehub::model::{BranchName, FileName, RepoName, Repository, User, Username};
use forgehub::repos::{NewRepository, create_repository};
use forgehub::snapshot::resolve_latest;
use forgehub::users::create_user;
use forgehub::{Store, StoreOptions};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Files written per commit.
const FILES_PER_COMMIT: usize = 50;

/// Build a store whose `main` holds `files` distinct files, each rewritten
/// twice across the history.
fn make_wide_branch(files: usize) -> (tempfile::TempDir, Store, User, Repository) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = Store::open(dir.path().join("bench.db"), &StoreOptions::default()).expect("open store");
    let user = create_user(
        &mut store,
        &AccountsConfig::default(),
        &Username::new("bench").expect("username"),
        "bench@example.com",
    )
    .expect("create user");
    let new = NewRepository {
        init_readme: Some(false),
        ..NewRepository::new(RepoName::new("wide").expect("repo name"))
    };
    let repo = create_repository(&mut store, &RepositoryConfig::default(), user.id, &new).expect("create repo");
    let main = BranchName::new("main").expect("branch name");

    for round in 0..2 {
        for chunk in (0..files).collect::<Vec<_>>().chunks(FILES_PER_COMMIT) {
            let batch: Vec<_> = chunk
                .iter()
                .map(|i| {
                    let name = FileName::new(&format!("dir{}/file{i}.txt", i % 16)).expect("file name");
                    NewFile::new(name, format!("round {round} of file {i}\n").into_bytes())
                })
                .collect();
            append_commit(&mut store, repo.id, &main, user.id, "bench", &batch).expect("append");
        }
    }
    (dir, store, user, repo)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_resolve_latest(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_latest");
    let main = BranchName::new("main").expect("branch name");
    for files in [100, 1_000, 5_000] {
        let (_dir, mut store, _user, repo) = make_wide_branch(files);
        group.throughput(Throughput::Elements(files as u64));
        group.bench_with_input(BenchmarkId::from_parameter(files), &files, |b, _| {
            b.iter(|| resolve_latest(&mut store, repo.id, &main).expect("resolve"));
        });
    }
    group.finish();
}

fn bench_fork(c: &mut Criterion) {
    let mut group = c.benchmark_group("fork_branch");
    group.sample_size(20);
    let main = BranchName::new("main").expect("branch name");
    for files in [100, 1_000] {
        let (_dir, mut store, user, repo) = make_wide_branch(files);
        let mut n = 0u64;
        group.throughput(Throughput::Elements(files as u64));
        group.bench_with_input(BenchmarkId::from_parameter(files), &files, |b, _| {
            b.iter(|| {
                n += 1;
                let name = BranchName::new(&format!("fork-{n}")).expect("branch name");
                fork_branch(&mut store, repo.id, &main, &name, user.id).expect("fork")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolve_latest, bench_fork);
criterion_main!(benches);
