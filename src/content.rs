//! Content updates and reads inside a job workspace
//!
//! An update re-syncs the tracked branch, writes one file, commits it and
//! pushes straight away. When anything after the write fails, the branch is
//! reset to where it was before the update so the workspace keeps mirroring
//! the remote.

use git2::Signature;
use std::fs;
use std::path::{Component, Path};

use crate::config::{EngineConfig, Identity};
use crate::detect::CommitId;
use crate::error::{Error, Operation, Result};
use crate::git::Repository;
use crate::job::JobId;
use crate::storage::WorkspaceStore;
use crate::validation::{validate_branch, validate_workspace_path};

/// A single-file change to commit and push
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub branch: String,
    /// Path relative to the workspace root
    pub path: String,
    pub content: Vec<u8>,
    pub message: Option<String>,
    pub author: Option<Identity>,
    pub committer: Option<Identity>,
    /// Git blob id the caller believes the file currently has; the update is
    /// refused when the branch holds something else
    pub expected_sha: Option<String>,
}

impl CommitRequest {
    pub fn new(branch: impl Into<String>, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            branch: branch.into(),
            path: path.into(),
            content: content.into(),
            message: None,
            author: None,
            committer: None,
            expected_sha: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn author(mut self, identity: Identity) -> Self {
        self.author = Some(identity);
        self
    }

    pub fn committer(mut self, identity: Identity) -> Self {
        self.committer = Some(identity);
        self
    }

    pub fn expected_sha(mut self, sha: impl Into<String>) -> Self {
        self.expected_sha = Some(sha.into());
        self
    }
}

/// What an update did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub remote_url: String,
    /// Branch tip after the fast-forward, before the new commit
    pub base: CommitId,
    /// Branch tip after the push; equals `base` when the content was unchanged
    pub tip: CommitId,
}

/// Apply `request` to the workspace of `job_id`
pub fn apply_update(
    store: &WorkspaceStore,
    config: &EngineConfig,
    job_id: &JobId,
    request: &CommitRequest,
) -> Result<UpdateOutcome> {
    validate_branch(&request.branch)?;
    validate_workspace_path(&request.path)?;
    let rel_path = normalize(&request.path);
    let branch = request.branch.as_str();

    let repo = open_existing(store, config, job_id)?;
    if !repo.local_branch_exists(branch)? {
        return Err(Error::precondition(
            job_id,
            format!("branch '{}' is not tracked by this workspace", branch),
        ));
    }

    repo.fetch(branch, config.clone_depth)?;
    repo.checkout_tracking(branch)?;
    repo.fast_forward(branch)?;

    let base = repo.branch_tip(branch)?.ok_or_else(|| Error::BranchNotFound {
        job_id: job_id.clone(),
        branch: branch.to_string(),
    })?;

    if let Some(expected) = &request.expected_sha {
        let actual = repo.blob_id(branch, &rel_path)?.map(|oid| oid.to_string());
        if actual.as_deref() != Some(expected.trim().to_lowercase().as_str()) {
            return Err(Error::ContentConflict {
                job_id: job_id.clone(),
                path: rel_path,
                expected: expected.clone(),
                actual,
            });
        }
    }

    let file = repo.workdir()?.join(&rel_path);
    let existed = file.exists();

    let tip = match write_commit_push(&repo, config, request, &rel_path, &file) {
        Ok(tip) => tip.unwrap_or(base),
        Err(e) => {
            tracing::warn!(job = %job_id, branch, error = %e, "Update failed, restoring branch");
            rollback(&repo, base, &file, existed);
            return Err(e);
        }
    };

    if tip == base {
        tracing::info!(job = %job_id, branch, path = %rel_path, "Content unchanged, nothing pushed");
    }

    Ok(UpdateOutcome {
        remote_url: repo.remote_url()?,
        base: base.into(),
        tip: tip.into(),
    })
}

/// Read `path` as committed at the tip of `branch`
pub fn read_content(
    store: &WorkspaceStore,
    config: &EngineConfig,
    job_id: &JobId,
    branch: &str,
    path: &str,
) -> Result<Vec<u8>> {
    validate_branch(branch)?;
    validate_workspace_path(path)?;
    let rel_path = normalize(path);

    let repo = open_existing(store, config, job_id)?;
    repo.read_file(branch, &rel_path)?.ok_or_else(|| Error::FileNotFound {
        job_id: job_id.clone(),
        branch: branch.to_string(),
        path: rel_path,
    })
}

fn open_existing(store: &WorkspaceStore, config: &EngineConfig, job_id: &JobId) -> Result<Repository> {
    let path = store.location_for(job_id);
    if !store.contains_repository(&path) {
        return Err(Error::precondition(job_id, "workspace has not been synced yet"));
    }
    Repository::open(job_id, &path, &config.remote_name)
}

fn write_commit_push(
    repo: &Repository,
    config: &EngineConfig,
    request: &CommitRequest,
    rel_path: &str,
    file: &Path,
) -> Result<Option<git2::Oid>> {
    let job_id = repo.job_id();

    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::filesystem(job_id, parent, e))?;
    }
    fs::write(file, &request.content).map_err(|e| Error::filesystem(job_id, file, e))?;

    let author = resolve_signature(repo, config, request.author.as_ref())?;
    let committer = resolve_signature(repo, config, request.committer.as_ref())?;
    let message = request
        .message
        .clone()
        .unwrap_or_else(|| format!("Update {}", rel_path));

    let Some(commit) = repo.commit_path(rel_path, &message, &author, &committer)? else {
        return Ok(None);
    };

    repo.push(&request.branch)?;
    tracing::info!(job = %job_id, branch = %request.branch, path = rel_path, %commit, "Committed and pushed update");
    Ok(Some(commit))
}

/// Caller identity, else the repository's configured user, else the engine
/// default
fn resolve_signature(
    repo: &Repository,
    config: &EngineConfig,
    identity: Option<&Identity>,
) -> Result<Signature<'static>> {
    let signature = match identity {
        Some(identity) => identity.signature(),
        None => match repo.configured_signature() {
            Some(signature) => Ok(signature),
            None => config.default_identity.signature(),
        },
    };
    signature.map_err(|e| Error::git(repo.job_id(), Operation::Commit, e))
}

fn rollback(repo: &Repository, base: git2::Oid, file: &Path, existed: bool) {
    if let Err(e) = repo.reset_hard(base) {
        tracing::error!(job = %repo.job_id(), error = %e, "Failed to reset branch after failed update");
    }
    if !existed {
        if let Err(e) = fs::remove_file(file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(job = %repo.job_id(), path = %file.display(), error = %e, "Failed to remove new file");
            }
        }
    }
}

/// `./docs//readme.txt` -> `docs/readme.txt`
fn normalize(path: &str) -> String {
    Path::new(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
