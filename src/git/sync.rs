//! Git sync operations for gitsync
//!
//! Fetch, fast-forward-only pull, and push against the tracked remote.

use git2::build::CheckoutBuilder;
use git2::{FetchOptions, PushOptions, RemoteCallbacks};
use std::cell::RefCell;

use super::{local_ref, Repository};
use crate::error::{Error, Operation, Result};

/// Outcome of bringing a local branch up to its remote-tracking ref
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastForward {
    /// Local branch already matched the remote
    UpToDate,
    /// Local branch advanced to the remote tip
    Advanced,
}

/// Remote callbacks resolving credentials from the SSH agent or git
/// credential helpers
fn remote_callbacks<'a>(config: Option<git2::Config>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        if allowed.is_ssh_key() {
            if let Some(user) = username_from_url {
                return git2::Cred::ssh_key_from_agent(user);
            }
        }
        if allowed.is_user_pass_plaintext() {
            if let Some(ref cfg) = config {
                if let Ok(cred) = git2::Cred::credential_helper(cfg, url, username_from_url) {
                    return Ok(cred);
                }
            }
        }
        git2::Cred::default()
    });
    callbacks
}

/// Fetch options limited to `depth` commits (0 means full history)
///
/// Without a repository config the user's global git config is used for
/// credential helpers.
pub(crate) fn fetch_options<'a>(config: Option<git2::Config>, depth: u32) -> FetchOptions<'a> {
    let config = config.or_else(|| git2::Config::open_default().ok());
    let mut options = FetchOptions::new();
    options.remote_callbacks(remote_callbacks(config));
    if depth > 0 {
        options.depth(i32::try_from(depth).unwrap_or(i32::MAX));
    }
    options
}

/// Depth to request from `url`
///
/// libgit2's local transport cannot serve shallow fetches, so local paths
/// and `file://` URLs always get full history.
pub(crate) fn effective_depth(url: &str, depth: u32) -> u32 {
    if depth > 0 && is_local_url(url) {
        tracing::debug!(url, depth, "Local remote, fetching full history");
        return 0;
    }
    depth
}

fn is_local_url(url: &str) -> bool {
    if url.starts_with("file://") {
        return true;
    }
    if url.contains("://") {
        return false;
    }
    // scp-like `host:path` is ssh
    !url.contains(':') || std::path::Path::new(url).exists()
}

impl Repository {
    /// Fetch `branch` from the tracked remote into its remote-tracking ref
    pub fn fetch(&self, branch: &str, depth: u32) -> Result<()> {
        let mut remote = self
            .inner
            .find_remote(&self.remote)
            .map_err(|e| self.error(Operation::Fetch, e))?;

        let depth = effective_depth(remote.url().unwrap_or_default(), depth);
        let refspec = format!("+refs/heads/{0}:refs/remotes/{1}/{0}", branch, self.remote);
        let mut options = fetch_options(self.inner.config().ok(), depth);

        remote
            .fetch(&[refspec.as_str()], Some(&mut options), None)
            .map_err(|e| self.error(Operation::Fetch, e))?;

        tracing::debug!(job = %self.job_id, branch, "Fetched");
        Ok(())
    }

    /// Fast-forward the checked-out `branch` to its remote-tracking ref
    ///
    /// The working tree is updated before the branch ref moves, so a failed
    /// checkout leaves both untouched. Local commits the remote does not have
    /// are reported as a conflict.
    pub fn fast_forward(&self, branch: &str) -> Result<FastForward> {
        let upstream = self.upstream_tip(branch)?.ok_or_else(|| Error::BranchNotFound {
            job_id: self.job_id.clone(),
            branch: branch.to_string(),
        })?;
        let local = self.branch_tip(branch)?.ok_or_else(|| Error::BranchNotFound {
            job_id: self.job_id.clone(),
            branch: branch.to_string(),
        })?;

        if local == upstream {
            return Ok(FastForward::UpToDate);
        }

        let refname = local_ref(branch);
        let mut reference = self
            .inner
            .find_reference(&refname)
            .map_err(|e| self.error(Operation::Pull, e))?;
        let incoming = self
            .inner
            .find_annotated_commit(upstream)
            .map_err(|e| self.error(Operation::Pull, e))?;
        let (analysis, _) = self
            .inner
            .merge_analysis_for_ref(&reference, &[&incoming])
            .map_err(|e| self.error(Operation::Pull, e))?;

        if !analysis.is_fast_forward() {
            tracing::warn!(job = %self.job_id, branch, %local, %upstream, "Local branch diverged from remote");
            return Err(Error::BranchConflict {
                job_id: self.job_id.clone(),
                branch: branch.to_string(),
                operation: Operation::Pull,
            });
        }

        let is_head = self
            .inner
            .head()
            .ok()
            .and_then(|head| head.name().map(|name| name == refname))
            .unwrap_or(false);

        if is_head {
            let target = self
                .inner
                .find_object(upstream, None)
                .map_err(|e| self.error(Operation::Pull, e))?;
            let mut checkout = CheckoutBuilder::new();
            checkout.safe();
            self.inner
                .checkout_tree(&target, Some(&mut checkout))
                .map_err(|e| self.error(Operation::Pull, e))?;
        }

        reference
            .set_target(upstream, &format!("gitsync: fast-forward {}", branch))
            .map_err(|e| self.error(Operation::Pull, e))?;

        tracing::info!(job = %self.job_id, branch, from = %local, to = %upstream, "Fast-forwarded");
        Ok(FastForward::Advanced)
    }

    /// Fetch then fast-forward `branch`
    pub fn pull(&self, branch: &str, depth: u32) -> Result<FastForward> {
        self.fetch(branch, depth)?;
        self.fast_forward(branch)
    }

    /// Push the local `branch` to the same-named branch on the remote
    ///
    /// Non-fast-forward rejections become [`Error::BranchConflict`]; nothing
    /// is forced.
    pub fn push(&self, branch: &str) -> Result<()> {
        let mut remote = self
            .inner
            .find_remote(&self.remote)
            .map_err(|e| self.error(Operation::Push, e))?;

        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        let rejection: RefCell<Option<String>> = RefCell::new(None);

        {
            let mut callbacks = remote_callbacks(self.inner.config().ok());
            callbacks.push_update_reference(|_refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(message.to_string());
                }
                Ok(())
            });

            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            if let Err(e) = remote.push(&[refspec.as_str()], Some(&mut options)) {
                if e.code() == git2::ErrorCode::NotFastForward {
                    return Err(self.push_conflict(branch));
                }
                return Err(self.error(Operation::Push, e));
            }
        }

        if let Some(message) = rejection.into_inner() {
            tracing::warn!(job = %self.job_id, branch, %message, "Push rejected by remote");
            // Servers only report rejections as text.
            if message.contains("non-fast-forward") || message.contains("fetch first") {
                return Err(self.push_conflict(branch));
            }
            return Err(Error::PushRejected {
                job_id: self.job_id.clone(),
                branch: branch.to_string(),
                message,
            });
        }

        tracing::info!(job = %self.job_id, branch, "Pushed");
        Ok(())
    }

    fn push_conflict(&self, branch: &str) -> Error {
        Error::BranchConflict {
            job_id: self.job_id.clone(),
            branch: branch.to_string(),
            operation: Operation::Push,
        }
    }
}
