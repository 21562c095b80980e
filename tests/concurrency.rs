//! Concurrent writers on one database, each with its own connection.
//!
//! Real OS threads are released together by a `Barrier` so their
//! transactions overlap as much as possible. Writers that lose the race for
//! the write lock wait on the busy timeout, or come back `Retryable` and are
//! re-issued through `with_retry`.

mod common;

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use forgehub::CoreError;
use forgehub::branches::list_branches;
use forgehub::commit_log::{append_commit, list_commits};
use forgehub::contributors::{ensure_contributor, list_contributors};
use forgehub::fork::fork_branch;
use forgehub::error::ErrorClass;
use forgehub::model::Role;
use forgehub::retry::{RetryPolicy, with_retry};
use forgehub::snapshot::resolve_latest;

use common::{TestForge, branch_name, contents, new_files};

const THREADS: usize = 6;

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        base_delay: Duration::from_millis(5),
    }
}

#[test]
fn concurrent_membership_checks_add_exactly_one_row() {
    let mut forge = TestForge::new();
    let alice = forge.user("alice");
    let bob = forge.user("bob");
    let repo = forge.empty_repo(&alice, "proj");

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let mut store = forge.open();
            thread::spawn(move || {
                barrier.wait();
                with_retry(policy(), || ensure_contributor(&mut store, repo.id, bob.id)).unwrap()
            })
        })
        .collect();
    let inserted: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(inserted.iter().filter(|&&added| added).count(), 1, "{inserted:?}");
    let members = list_contributors(&mut forge.store, repo.id).unwrap();
    let bobs: Vec<_> = members.iter().filter(|m| m.user_id == bob.id).collect();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].role, Role::Contributor);
}

#[test]
fn concurrent_appends_keep_every_commit_in_order() {
    let mut forge = TestForge::new();
    let alice = forge.user("alice");
    let authors: Vec<_> = (0..THREADS).map(|i| forge.user(&format!("writer{i}"))).collect();
    let repo = forge.empty_repo(&alice, "proj");

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let plan: Vec<usize> = (0..THREADS).map(|_| rng.random_range(2..6)).collect();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = authors
        .iter()
        .cloned()
        .zip(plan.clone())
        .enumerate()
        .map(|(t, (author, commits))| {
            let barrier = Arc::clone(&barrier);
            let mut store = forge.open();
            let repo_id = repo.id;
            thread::spawn(move || {
                let main = branch_name("main");
                barrier.wait();
                for k in 0..commits {
                    let name = format!("t{t}-{k}.txt");
                    let body = format!("written by writer{t}");
                    let files = new_files(&[(name.as_str(), body.as_bytes()), ("shared.txt", body.as_bytes())]);
                    with_retry(policy(), || append_commit(&mut store, repo_id, &main, author.id, "concurrent", &files))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let main = branch_name("main");
    let commits = list_commits(&mut forge.store, repo.id, &main, None).unwrap();
    assert_eq!(commits.len(), 1 + plan.iter().sum::<usize>());
    for pair in commits.windows(2) {
        assert!(pair[0].commit.order() > pair[1].commit.order(), "log out of order: {pair:?}");
    }
    let ids: HashSet<_> = commits.iter().map(|c| c.commit.id).collect();
    assert_eq!(ids.len(), commits.len());

    let snapshot = resolve_latest(&mut forge.store, repo.id, &main).unwrap();
    assert_eq!(snapshot.as_of, Some(commits[0].commit.id));
    for (t, author) in authors.iter().enumerate() {
        for k in 0..plan[t] {
            let file = snapshot.get(&format!("t{t}-{k}.txt")).unwrap();
            assert_eq!(file.commit.author_id, author.id, "file attributed to the wrong writer");
        }
    }
    let shared = snapshot.get("shared.txt").unwrap();
    assert_eq!(shared.commit.id, commits[0].commit.id);

    let files = forge.contents(&repo, "main");
    let expected = format!("written by {}", commits[0].commit.author);
    assert_eq!(files["shared.txt"], expected.as_bytes());
}

#[test]
fn forks_racing_appends_copy_a_consistent_snapshot() {
    let mut forge = TestForge::new();
    let alice = forge.user("alice");
    let bob = forge.user("bob");
    let repo = forge.empty_repo(&alice, "proj");
    forge.commit(&repo, "main", &alice, &[("counter", b"0")]);

    const ROUNDS: usize = 12;
    let barrier = Arc::new(Barrier::new(2));

    let writer = {
        let barrier = Arc::clone(&barrier);
        let mut store = forge.open();
        let repo_id = repo.id;
        thread::spawn(move || {
            let main = branch_name("main");
            barrier.wait();
            for i in 1..=ROUNDS {
                let counter = i.to_string();
                let extra = format!("file-{i}");
                let files = new_files(&[("counter", counter.as_bytes()), (extra.as_str(), b"x")]);
                with_retry(policy(), || append_commit(&mut store, repo_id, &main, alice.id, "tick", &files)).unwrap();
            }
        })
    };

    let forker = {
        let barrier = Arc::clone(&barrier);
        let mut store = forge.open();
        let repo_id = repo.id;
        thread::spawn(move || {
            let main = branch_name("main");
            barrier.wait();
            (0..ROUNDS)
                .map(|i| {
                    let name = branch_name(&format!("snap-{i}"));
                    with_retry(policy(), || fork_branch(&mut store, repo_id, &main, &name, bob.id)).unwrap()
                })
                .collect::<Vec<_>>()
        })
    };

    writer.join().unwrap();
    let forks = forker.join().unwrap();

    for fork in forks {
        let at = fork.forked_from_commit_id.unwrap();
        let base_then = contents(&mut forge.store, &repo, "main", Some(at));
        let copied = contents(&mut forge.store, &repo, fork.name.as_str(), None);
        assert_eq!(copied, base_then, "fork {} diverges from main at {at}", fork.name);

        let counter: usize = String::from_utf8(copied["counter"].clone()).unwrap().parse().unwrap();
        assert_eq!(copied.len(), counter + 1, "counter and file set disagree in {}", fork.name);
    }
}

#[test]
fn lock_timeout_surfaces_as_retryable_and_leaves_nothing_behind() {
    let mut forge = TestForge::new();
    let alice = forge.user("alice");
    let repo = forge.empty_repo(&alice, "proj");
    let main = branch_name("main");
    let mut holder = forge.open();
    let mut impatient = forge.open_with_timeout(Duration::from_millis(50));

    let files = new_files(&[("late.txt", b"late")]);
    let (append_err, fork_err) = holder
        .write(|_| {
            let append = append_commit(&mut impatient, repo.id, &main, alice.id, "blocked", &files).unwrap_err();
            let fork = fork_branch(&mut impatient, repo.id, &main, &branch_name("blocked"), alice.id).unwrap_err();
            Ok::<_, CoreError>((append, fork))
        })
        .unwrap();

    for err in [&append_err, &fork_err] {
        assert_eq!(err.class(), ErrorClass::Retryable, "{err}");
        assert!(err.is_retryable());
    }
    assert_eq!(list_commits(&mut forge.store, repo.id, &main, None).unwrap().len(), 1);
    assert_eq!(list_branches(&mut forge.store, repo.id).unwrap().len(), 1);
    assert!(!forge.contents(&repo, "main").contains_key("late.txt"));
}

#[test]
fn retry_succeeds_once_the_lock_is_released() {
    let mut forge = TestForge::new();
    let alice = forge.user("alice");
    let repo = forge.empty_repo(&alice, "proj");
    let mut impatient = forge.open_with_timeout(Duration::from_millis(50));

    let (locked_tx, locked_rx) = mpsc::channel();
    let holder = {
        let mut store = forge.open();
        thread::spawn(move || {
            store
                .write(|_| {
                    locked_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(200));
                    Ok::<_, CoreError>(())
                })
                .unwrap();
        })
    };
    locked_rx.recv().unwrap();

    let main = branch_name("main");
    let files = new_files(&[("late.txt", b"late")]);
    let patient = RetryPolicy {
        max_attempts: 20,
        base_delay: Duration::from_millis(10),
    };
    let commit = with_retry(patient, || append_commit(&mut impatient, repo.id, &main, alice.id, "eventually", &files))
        .unwrap();
    holder.join().unwrap();

    let log = list_commits(&mut forge.store, repo.id, &main, None).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].commit.id, commit.id);
    assert_eq!(forge.contents(&repo, "main")["late.txt"], b"late");
}
