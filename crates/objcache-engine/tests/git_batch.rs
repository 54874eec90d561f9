//! Runs the engine against a real `git cat-file --batch`.
//!
//! Skipped when `git` is not installed.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use objcache_engine::{Engine, EngineConfig, Walk};
use objcache_store::{EntryKind, ObjectCache};
use objcache_types::ObjectId;

fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(["-c", "user.name=objcache", "-c", "user.email=objcache@example.com"])
        .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
        .args(args)
        .current_dir(dir)
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// A repository with two commits, a nested directory and a duplicated file.
fn fixture(dir: &Path) -> Option<(ObjectId, ObjectId)> {
    git(dir, &["init", "-q"])?;
    std::fs::create_dir_all(dir.join("src/nested")).ok()?;
    std::fs::write(dir.join("README.md"), "# fixture\n").ok()?;
    std::fs::write(dir.join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").ok()?;
    std::fs::write(dir.join("src/nested/copy.md"), "# fixture\n").ok()?;
    git(dir, &["add", "."])?;
    git(dir, &["commit", "-q", "-m", "initial import"])?;

    std::fs::write(dir.join("CHANGES"), "second\n").ok()?;
    git(dir, &["add", "."])?;
    git(dir, &["commit", "-q", "-m", "add changes\n\nwith a body"])?;

    let head = git(dir, &["rev-parse", "HEAD"])?.parse().ok()?;
    let tree = git(dir, &["rev-parse", "HEAD^{tree}"])?.parse().ok()?;
    Some((head, tree))
}

#[tokio::test]
async fn walks_a_real_repository() {
    let dir = tempfile::tempdir().unwrap();
    let Some((head, tree)) = fixture(dir.path()) else {
        eprintln!("git unavailable, skipping");
        return;
    };

    let cache = Arc::new(ObjectCache::new());
    let engine = Engine::start(&EngineConfig::for_repository(dir.path()), Arc::clone(&cache)).unwrap();

    let commit = engine.lookup_commit(head, 1).await.unwrap().unwrap();
    let commit = commit.get().unwrap();
    assert_eq!(commit.summary(), "add changes");
    assert_eq!(commit.tree, Some(tree));
    assert_eq!(commit.parents.len(), 1);
    assert_eq!(commit.author.as_ref().unwrap().name, "objcache");
    let parent = cache.peek_commit(&commit.parents[0]).unwrap();
    assert!(parent.get().unwrap().is_root());

    // Root, src, src/nested, and four blobs of which two share content.
    let report = engine.run_walk(Walk::tree(tree)).await.unwrap();
    assert_eq!(report.fetched, 6);
    assert!(report.missing.is_empty());

    let entry = engine.lookup_path(tree, "src/lib.rs").await.unwrap().unwrap();
    assert_eq!(entry.kind(), EntryKind::Blob);
    let blob = engine.lookup_blob(entry.id).await.unwrap().unwrap();
    assert_eq!(blob.get().unwrap().text(), "pub fn answer() -> u32 { 42 }\n");

    let absent = ObjectId::from_raw([0xee; 20]);
    assert!(engine.lookup_blob(absent).await.unwrap().is_none());

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn spawn_failure_is_reported() {
    let config = EngineConfig {
        program: "objcache-definitely-missing".into(),
        ..EngineConfig::default()
    };
    assert!(Engine::start(&config, Arc::new(ObjectCache::new())).is_err());
}
