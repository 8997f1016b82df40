//! Workspace store - one directory per job under a shared root
//!
//! Directory structure:
//! ```text
//! <workspace-root>/
//!   42/            <- git working tree for job 42
//!     .git/
//!     ...
//!   docs-site/
//!     .git/
//!     ...
//! ```
//!
//! The store never deletes a workspace directory. It does no locking either;
//! callers serialize access per job through the engine's lock table.

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::job::JobId;

/// Maps job ids to workspace directories
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workspace path for a job; the same id always maps to the same path
    pub fn location_for(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }

    /// Create the directory and any missing parents; no-op if present
    pub fn ensure_exists(&self, job_id: &JobId, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| Error::filesystem(job_id, path, e))
    }

    /// Whether a git repository already lives at `path`
    pub fn contains_repository(&self, path: &Path) -> bool {
        path.join(".git").exists() && git2::Repository::open(path).is_ok()
    }

    /// Remove everything inside a workspace while keeping the directory
    ///
    /// Used after a failed clone so the next attempt starts from scratch.
    pub fn clear(&self, job_id: &JobId, path: &Path) -> Result<()> {
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::filesystem(job_id, path, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| Error::filesystem(job_id, path, e))?;
            let entry_path = entry.path();
            let removed = if entry_path.is_dir() {
                fs::remove_dir_all(&entry_path)
            } else {
                fs::remove_file(&entry_path)
            };
            removed.map_err(|e| Error::filesystem(job_id, &entry_path, e))?;
        }

        Ok(())
    }

    /// Ids of all jobs that have a workspace directory, sorted
    pub fn list(&self) -> Vec<JobId> {
        if !self.root.exists() {
            return Vec::new();
        }

        let mut jobs: Vec<JobId> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| e.file_name().to_str().and_then(|name| JobId::parse(name).ok()))
            .collect();

        jobs.sort();
        jobs
    }
}
