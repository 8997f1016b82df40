//! Git backend for gitsync
//!
//! Wraps a libgit2 repository living in one job's workspace.
//!
//! # Mirror Model
//!
//! A workspace mirrors exactly one branch of one remote:
//!
//! 1. **Clone**: shallow, on the first sync of a job.
//! 2. **Checkout**: the tracked branch is created from its remote
//!    counterpart once, then reused.
//! 3. **Pull**: fetch, then fast-forward only. A diverged branch is reported,
//!    never merged or rebased.
//! 4. **Commit + push**: content updates are pushed immediately; a rejected
//!    push rolls the local branch back so the next pull stays a fast-forward.

use git2::{build::RepoBuilder, ErrorCode, ObjectType, Oid, Repository as Git2Repo, Signature};
use std::path::Path;

use crate::error::{Error, Operation, Result};
use crate::job::JobId;

mod branch;
mod sync;

pub use sync::FastForward;

/// Git repository wrapper for one job workspace
pub struct Repository {
    inner: Git2Repo,
    job_id: JobId,
    remote: String,
}

impl Repository {
    /// Clone `url` into `path`, keeping at most `depth` commits of history
    ///
    /// A depth of 0 clones the full history.
    pub fn clone_shallow(
        job_id: &JobId,
        url: &str,
        path: &Path,
        remote: &str,
        depth: u32,
    ) -> Result<Self> {
        let depth = sync::effective_depth(url, depth);
        let mut builder = RepoBuilder::new();
        builder.fetch_options(sync::fetch_options(None, depth));

        let remote_name = remote.to_string();
        builder.remote_create(move |repo, _name, url| repo.remote(&remote_name, url));

        let inner = builder
            .clone(url, path)
            .map_err(|e| Error::git(job_id, Operation::Clone, e))?;

        tracing::info!(job = %job_id, url, depth, "Cloned workspace");

        Ok(Self {
            inner,
            job_id: job_id.clone(),
            remote: remote.to_string(),
        })
    }

    /// Open an existing workspace
    pub fn open(job_id: &JobId, path: &Path, remote: &str) -> Result<Self> {
        let inner = Git2Repo::open(path).map_err(|e| Error::git(job_id, Operation::Open, e))?;

        Ok(Self {
            inner,
            job_id: job_id.clone(),
            remote: remote.to_string(),
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// URL of the tracked remote
    pub fn remote_url(&self) -> Result<String> {
        let remote = self
            .inner
            .find_remote(&self.remote)
            .map_err(|e| self.error(Operation::Open, e))?;

        remote.url().map(str::to_string).ok_or_else(|| {
            Error::precondition(&self.job_id, format!("remote '{}' has no UTF-8 URL", self.remote))
        })
    }

    /// Root of the working tree
    pub fn workdir(&self) -> Result<&Path> {
        self.inner
            .workdir()
            .ok_or_else(|| Error::precondition(&self.job_id, "workspace is a bare repository"))
    }

    /// Commit id the local branch points at, if the branch exists
    pub fn branch_tip(&self, branch: &str) -> Result<Option<Oid>> {
        self.ref_target(&local_ref(branch), Operation::Read)
    }

    /// Commit id of the remote-tracking ref for `branch`, if fetched
    pub fn upstream_tip(&self, branch: &str) -> Result<Option<Oid>> {
        self.ref_target(&self.upstream_ref(branch), Operation::Read)
    }

    /// Read a file from the tip commit of `branch`
    ///
    /// Returns `None` when the path does not exist in that commit.
    pub fn read_file(&self, branch: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(blob_id) = self.blob_id(branch, path)? else {
            return Ok(None);
        };

        let blob = self
            .inner
            .find_blob(blob_id)
            .map_err(|e| self.error(Operation::Read, e))?;
        Ok(Some(blob.content().to_vec()))
    }

    /// Git blob id of `path` at the tip of `branch`
    pub fn blob_id(&self, branch: &str, path: &str) -> Result<Option<Oid>> {
        let tip = self.branch_tip(branch)?.ok_or_else(|| Error::BranchNotFound {
            job_id: self.job_id.clone(),
            branch: branch.to_string(),
        })?;

        let tree = self
            .inner
            .find_commit(tip)
            .and_then(|commit| commit.tree())
            .map_err(|e| self.error(Operation::Read, e))?;

        match tree.get_path(Path::new(path)) {
            Ok(entry) if entry.kind() == Some(ObjectType::Blob) => Ok(Some(entry.id())),
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(self.error(Operation::Read, e)),
        }
    }

    /// Stage a single path and commit it on the checked-out branch
    ///
    /// Returns `None` when the staged tree is identical to HEAD, in which case
    /// no commit is created.
    pub fn commit_path(
        &self,
        path: &str,
        message: &str,
        author: &Signature<'_>,
        committer: &Signature<'_>,
    ) -> Result<Option<Oid>> {
        let mut index = self
            .inner
            .index()
            .map_err(|e| self.error(Operation::Commit, e))?;
        index
            .add_path(Path::new(path))
            .and_then(|_| index.write())
            .map_err(|e| self.error(Operation::Commit, e))?;

        let tree_id = index
            .write_tree()
            .map_err(|e| self.error(Operation::Commit, e))?;
        let tree = self
            .inner
            .find_tree(tree_id)
            .map_err(|e| self.error(Operation::Commit, e))?;

        let parent = self
            .inner
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|e| self.error(Operation::Commit, e))?;

        if parent.tree_id() == tree_id {
            return Ok(None);
        }

        let oid = self
            .inner
            .commit(Some("HEAD"), author, committer, message, &tree, &[&parent])
            .map_err(|e| self.error(Operation::Commit, e))?;

        Ok(Some(oid))
    }

    /// Signature configured in the repository (user.name / user.email)
    pub fn configured_signature(&self) -> Option<Signature<'static>> {
        self.inner.signature().ok()
    }

    /// Move the checked-out branch back to `oid`, discarding working tree changes
    pub fn reset_hard(&self, oid: Oid) -> Result<()> {
        let target = self
            .inner
            .find_object(oid, None)
            .map_err(|e| self.error(Operation::Checkout, e))?;
        self.inner
            .reset(&target, git2::ResetType::Hard, None)
            .map_err(|e| self.error(Operation::Checkout, e))
    }

    /// Get the underlying git2 repository (for advanced operations)
    pub fn inner(&self) -> &Git2Repo {
        &self.inner
    }

    fn upstream_ref(&self, branch: &str) -> String {
        format!("refs/remotes/{}/{}", self.remote, branch)
    }

    fn ref_target(&self, refname: &str, operation: Operation) -> Result<Option<Oid>> {
        match self.inner.refname_to_id(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(self.error(operation, e)),
        }
    }

    fn error(&self, operation: Operation, source: git2::Error) -> Error {
        Error::git(&self.job_id, operation, source)
    }
}

fn local_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}
