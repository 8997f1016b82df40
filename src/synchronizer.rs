//! Repository synchronizer
//!
//! Brings one job's workspace to the tip of its tracked branch: clone or
//! open, fetch, check out the branch, fast-forward. Runs on a blocking thread
//! with the job's lock held by the caller.

use std::path::Path;

use crate::config::EngineConfig;
use crate::detect::CommitId;
use crate::error::{Error, Result};
use crate::git::Repository;
use crate::job::JobId;
use crate::storage::WorkspaceStore;
use crate::validation::validate_branch;

/// Synchronize the workspace of `job_id` and return the branch tip
pub fn sync_workspace(
    store: &WorkspaceStore,
    config: &EngineConfig,
    job_id: &JobId,
    remote_url: &str,
    branch: &str,
) -> Result<CommitId> {
    validate_branch(branch)?;

    let path = store.location_for(job_id);
    let repo = open_or_clone(store, config, job_id, remote_url, &path)?;

    // Fetch before checkout so branches created on the remote after the
    // clone can be tracked.
    repo.fetch(branch, config.clone_depth)?;
    repo.checkout_tracking(branch)?;
    repo.fast_forward(branch)?;

    let tip = repo.branch_tip(branch)?.ok_or_else(|| Error::BranchNotFound {
        job_id: job_id.clone(),
        branch: branch.to_string(),
    })?;

    Ok(CommitId::from(tip))
}

/// Open the workspace at `path`, cloning `remote_url` into it first if it
/// holds no repository yet
///
/// The URL of an existing workspace is not compared against `remote_url`.
pub fn open_or_clone(
    store: &WorkspaceStore,
    config: &EngineConfig,
    job_id: &JobId,
    remote_url: &str,
    path: &Path,
) -> Result<Repository> {
    if store.contains_repository(path) {
        let repo = Repository::open(job_id, path, &config.remote_name)?;
        if let Ok(existing) = repo.remote_url() {
            if existing != remote_url {
                tracing::debug!(job = %job_id, %existing, requested = remote_url, "Keeping existing remote URL");
            }
        }
        return Ok(repo);
    }

    store.ensure_exists(job_id, path)?;

    match Repository::clone_shallow(job_id, remote_url, path, &config.remote_name, config.clone_depth) {
        Ok(repo) => Ok(repo),
        Err(e) => {
            // Leave an empty directory so the next attempt clones from scratch.
            if let Err(cleanup) = store.clear(job_id, path) {
                tracing::warn!(job = %job_id, error = %cleanup, "Failed to clean up after clone");
            }
            Err(e)
        }
    }
}
