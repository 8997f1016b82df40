//! Integration tests for gitsync
//!
//! Drive the engine against bare repositories on local disk standing in for
//! the remote.

use git2::{Oid, Repository, Signature};
use gitsync::{CommitRequest, Engine, EngineConfig, Error, JobId, JobSpec};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create an engine with its own workspace root
///
/// Local-path remotes cannot serve shallow fetches, so tests clone in full.
fn setup_engine() -> (TempDir, Engine) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let config = EngineConfig::new(tmp.path().join("workspaces")).with_clone_depth(0);
    let engine = Engine::new(config).expect("Failed to create engine");
    (tmp, engine)
}

/// Create a bare remote at `<tmp>/<name>` with one commit on `main`
fn create_remote(tmp: &TempDir, name: &str) -> (PathBuf, Oid) {
    let path = tmp.path().join(name);
    Repository::init_bare(&path).unwrap();
    let oid = push_external(&path, "main", "index.html", "<h1>v1</h1>");
    (path, oid)
}

/// Commit a file directly into the bare remote, as another contributor would
fn push_external(remote: &Path, branch: &str, file: &str, content: &str) -> Oid {
    let repo = Repository::open_bare(remote).unwrap();
    let refname = format!("refs/heads/{}", branch);
    let parent = repo
        .refname_to_id(&refname)
        .ok()
        .map(|oid| repo.find_commit(oid).unwrap());

    let base_tree = parent.as_ref().map(|p| p.tree().unwrap());
    let mut builder = repo.treebuilder(base_tree.as_ref()).unwrap();
    let blob = repo.blob(content.as_bytes()).unwrap();
    builder.insert(file, blob, 0o100644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();

    let sig = Signature::now("Contributor", "contributor@example.com").unwrap();
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    let oid = repo
        .commit(Some(&refname), &sig, &sig, "External change", &tree, &parents)
        .unwrap();

    if repo.head().is_err() {
        repo.set_head(&refname).unwrap();
    }
    oid
}

fn remote_tip(remote: &Path, branch: &str) -> Oid {
    Repository::open_bare(remote)
        .unwrap()
        .refname_to_id(&format!("refs/heads/{}", branch))
        .unwrap()
}

fn url(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn job(id: &str) -> JobId {
    JobId::parse(id).unwrap()
}

// =============================================================================
// Sync / Change Detection
// =============================================================================

#[tokio::test]
async fn test_first_sync_always_changed() {
    let (tmp, engine) = setup_engine();
    let (remote, tip) = create_remote(&tmp, "remote.git");

    let result = engine.sync(&job("42"), url(&remote), "main").await.unwrap();

    assert!(result.changed);
    assert_eq!(result.before, None);
    assert_eq!(result.after.oid(), tip);
    assert!(engine.location_for(&job("42")).join("index.html").exists());
}

#[tokio::test]
async fn test_second_sync_without_remote_change_is_unchanged() {
    let (tmp, engine) = setup_engine();
    let (remote, _) = create_remote(&tmp, "remote.git");

    engine.sync(&job("42"), url(&remote), "main").await.unwrap();
    let second = engine.sync(&job("42"), url(&remote), "main").await.unwrap();

    assert!(!second.changed);
    assert_eq!(second.before, Some(second.after));
}

#[tokio::test]
async fn test_sync_scenario_a_a_b() {
    let (tmp, engine) = setup_engine();
    let (remote, a) = create_remote(&tmp, "remote.git");
    let id = job("42");

    let first = engine.sync(&id, url(&remote), "main").await.unwrap();
    assert_eq!((first.before, first.after.oid(), first.changed), (None, a, true));

    let second = engine.sync(&id, url(&remote), "main").await.unwrap();
    assert_eq!(second.before.map(|c| c.oid()), Some(a));
    assert_eq!(second.after.oid(), a);
    assert!(!second.changed);

    let b = push_external(&remote, "main", "index.html", "<h1>v2</h1>");
    let third = engine.sync(&id, url(&remote), "main").await.unwrap();
    assert_eq!(third.before.map(|c| c.oid()), Some(a));
    assert_eq!(third.after.oid(), b);
    assert!(third.changed);

    let html = std::fs::read_to_string(engine.location_for(&id).join("index.html")).unwrap();
    assert_eq!(html, "<h1>v2</h1>");
}

#[tokio::test]
async fn test_new_engine_treats_existing_workspace_as_changed() {
    let (tmp, engine) = setup_engine();
    let (remote, _) = create_remote(&tmp, "remote.git");
    engine.sync(&job("42"), url(&remote), "main").await.unwrap();

    let restarted = Engine::new(engine.config().clone()).unwrap();
    let result = restarted.sync(&job("42"), url(&remote), "main").await.unwrap();

    assert!(result.changed);
    assert_eq!(result.before, None);
}

#[tokio::test]
async fn test_engines_with_separate_roots_are_isolated() {
    let (tmp, first) = setup_engine();
    let (remote, _) = create_remote(&tmp, "remote.git");
    let second = Engine::new(EngineConfig::new(tmp.path().join("other")).with_clone_depth(0)).unwrap();

    first.sync(&job("42"), url(&remote), "main").await.unwrap();
    let result = second.sync(&job("42"), url(&remote), "main").await.unwrap();

    assert!(result.changed);
    assert_ne!(first.location_for(&job("42")), second.location_for(&job("42")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_syncs_of_same_job_are_serialized() {
    let (tmp, engine) = setup_engine();
    let (remote, tip) = create_remote(&tmp, "remote.git");
    let remote_url = url(&remote).to_string();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let remote_url = remote_url.clone();
        handles.push(tokio::spawn(async move {
            engine.sync(&job("42"), &remote_url, "main").await
        }));
    }

    let mut changed = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.after.oid(), tip);
        if result.changed {
            changed += 1;
        }
    }

    assert_eq!(changed, 1);
    assert_eq!(engine.last_observed(&job("42")).await.map(|c| c.oid()), Some(tip));
}

#[tokio::test]
async fn test_missing_branch_is_reported() {
    let (tmp, engine) = setup_engine();
    let (remote, _) = create_remote(&tmp, "remote.git");

    let err = engine.sync(&job("42"), url(&remote), "release").await.unwrap_err();
    assert!(matches!(err, Error::BranchNotFound { .. }));
}

#[tokio::test]
async fn test_unreachable_remote_is_retryable_later() {
    let (tmp, engine) = setup_engine();
    let missing = tmp.path().join("not-there.git");

    let err = engine.sync(&job("42"), url(&missing), "main").await.unwrap_err();
    assert_eq!(err.job_id(), Some(&job("42")));

    let (remote, tip) = create_remote(&tmp, "remote.git");
    let result = engine.sync(&job("42"), url(&remote), "main").await.unwrap();
    assert!(result.changed);
    assert_eq!(result.after.oid(), tip);
}

#[tokio::test]
async fn test_invalid_job_id_rejected() {
    assert!(matches!(JobId::parse("../etc"), Err(Error::InvalidJobId { .. })));
    assert!(matches!(JobId::parse(""), Err(Error::InvalidJobId { .. })));
}

// =============================================================================
// Content Updates
// =============================================================================

#[tokio::test]
async fn test_update_then_sync_is_unchanged() {
    let (tmp, engine) = setup_engine();
    let (remote, _) = create_remote(&tmp, "remote.git");
    let id = job("42");
    engine.sync(&id, url(&remote), "main").await.unwrap();

    let request = CommitRequest::new("main", "docs/readme.txt", "hello").message("update docs");
    let returned = engine.update(&id, request).await.unwrap();
    assert_eq!(returned, url(&remote));

    let pushed = remote_tip(&remote, "main");
    assert_eq!(engine.last_observed(&id).await.map(|c| c.oid()), Some(pushed));

    let result = engine.sync(&id, url(&remote), "main").await.unwrap();
    assert!(!result.changed);
    assert_eq!(result.before.map(|c| c.oid()), Some(pushed));
}

#[tokio::test]
async fn test_update_scenario_after_external_commit() {
    let (tmp, engine) = setup_engine();
    let (remote, _) = create_remote(&tmp, "remote.git");
    let id = job("42");

    engine.sync(&id, url(&remote), "main").await.unwrap();
    push_external(&remote, "main", "index.html", "<h1>v2</h1>");
    engine.sync(&id, url(&remote), "main").await.unwrap();

    let request = CommitRequest::new("main", "docs/readme.txt", "hello").message("update docs");
    assert_eq!(engine.update(&id, request).await.unwrap(), url(&remote));

    let content = engine.read_content(&id, "main", "docs/readme.txt").await.unwrap();
    assert_eq!(content, b"hello");

    let repo = Repository::open_bare(&remote).unwrap();
    let commit = repo.find_commit(remote_tip(&remote, "main")).unwrap();
    assert_eq!(commit.message(), Some("update docs"));

    let next = engine.sync(&id, url(&remote), "main").await.unwrap();
    assert_eq!(next.before.map(|c| c.oid()), Some(commit.id()));
    assert!(!next.changed);
}

#[tokio::test]
async fn test_update_keeps_pending_external_change_visible() {
    let (tmp, engine) = setup_engine();
    let (remote, _) = create_remote(&tmp, "remote.git");
    let id = job("42");
    engine.sync(&id, url(&remote), "main").await.unwrap();

    // Arrives between sync and update; the update pulls it in.
    push_external(&remote, "main", "index.html", "<h1>v2</h1>");
    engine
        .update(&id, CommitRequest::new("main", "notes.txt", "n"))
        .await
        .unwrap();

    let result = engine.sync(&id, url(&remote), "main").await.unwrap();
    assert!(result.changed);
}

#[tokio::test]
async fn test_update_before_sync_fails() {
    let (_tmp, engine) = setup_engine();

    let err = engine
        .update(&job("42"), CommitRequest::new("main", "a.txt", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Precondition { .. }));
    assert!(err.suggestion().is_some());
}

#[tokio::test]
async fn test_update_rejects_escaping_paths() {
    let (tmp, engine) = setup_engine();
    let (remote, _) = create_remote(&tmp, "remote.git");
    engine.sync(&job("42"), url(&remote), "main").await.unwrap();

    for path in ["../evil.txt", "/etc/passwd", ".git/config"] {
        let err = engine
            .update(&job("42"), CommitRequest::new("main", path, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }), "{} accepted", path);
    }
}

// =============================================================================
// Batch Sync / Workspace Listing
// =============================================================================

#[tokio::test]
async fn test_sync_all_reports_each_job() {
    let (tmp, engine) = setup_engine();
    let (site, _) = create_remote(&tmp, "site.git");
    let (docs, _) = create_remote(&tmp, "docs.git");

    let jobs = vec![
        JobSpec::new(job("1"), url(&site), "main"),
        JobSpec::new(job("2"), url(&docs), "main"),
        JobSpec::new(job("3"), url(&tmp.path().join("gone.git")), "main"),
    ];

    let first = engine.sync_all(&jobs).await;
    assert_eq!(first.changed().len(), 2);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].job_id, job("3"));

    push_external(&docs, "main", "guide.md", "# Guide");
    let second = engine.sync_all(&jobs[..2]).await;
    assert_eq!(second.changed(), vec![&job("2")]);
    assert_eq!(second.unchanged(), vec![&job("1")]);
    assert_eq!(second.message(), "Refs changed, enqueued builds from 1 jobs.");

    let listed = engine.workspaces().list();
    assert!(listed.contains(&job("1")));
    assert!(listed.contains(&job("2")));
}
