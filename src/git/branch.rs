//! Tracked branch checkout
//!
//! Creating a branch that already exists is an error in git, so checkout
//! first asks whether the local branch exists and then either checks it out
//! or creates it from the remote-tracking ref.

use git2::{build::CheckoutBuilder, BranchType, ErrorCode};

use super::{local_ref, Repository};
use crate::error::{Error, Operation, Result};

impl Repository {
    /// Whether `refs/heads/<branch>` exists
    pub fn local_branch_exists(&self, branch: &str) -> Result<bool> {
        match self.inner.find_branch(branch, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(self.error(Operation::Checkout, e)),
        }
    }

    /// Check out `branch`, creating it to track the remote branch of the same
    /// name when it does not exist locally
    ///
    /// Calling this on an existing branch leaves the branch where it is.
    pub fn checkout_tracking(&self, branch: &str) -> Result<()> {
        if self.local_branch_exists(branch)? {
            tracing::debug!(job = %self.job_id, branch, "Checking out existing branch");
        } else {
            self.create_tracking_branch(branch)?;
        }

        let refname = local_ref(branch);
        let target = self
            .inner
            .revparse_single(&refname)
            .map_err(|e| self.error(Operation::Checkout, e))?;

        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.inner
            .checkout_tree(&target, Some(&mut checkout))
            .and_then(|_| self.inner.set_head(&refname))
            .map_err(|e| self.error(Operation::Checkout, e))
    }

    fn create_tracking_branch(&self, branch: &str) -> Result<()> {
        let upstream_name = format!("{}/{}", self.remote, branch);
        let upstream = match self.inner.find_branch(&upstream_name, BranchType::Remote) {
            Ok(upstream) => upstream,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(Error::BranchNotFound {
                    job_id: self.job_id.clone(),
                    branch: branch.to_string(),
                })
            }
            Err(e) => return Err(self.error(Operation::Checkout, e)),
        };

        let commit = upstream
            .get()
            .peel_to_commit()
            .map_err(|e| self.error(Operation::Checkout, e))?;

        let mut local = self
            .inner
            .branch(branch, &commit, false)
            .map_err(|e| self.error(Operation::Checkout, e))?;
        local
            .set_upstream(Some(upstream_name.as_str()))
            .map_err(|e| self.error(Operation::Checkout, e))?;

        tracing::info!(job = %self.job_id, branch, upstream = %upstream_name, "Created tracking branch");
        Ok(())
    }
}
