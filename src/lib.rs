//! gitsync - Workspace Synchronization & Change Detection
//!
//! Keeps one git workspace per job in step with a remote branch and reports
//! whether the branch moved, so the job service only builds when there is
//! something new.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Engine                                 │
//! │   sync(job, url, branch)      update(job, request)              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                  Lock Table (per job)                       ││
//! │  │     serializes work on one job, holds last-observed tip     ││
//! │  └──────────────────────────┬──────────────────────────────────┘│
//! │                             │                                   │
//! │          ┌──────────────────┼───────────────────┐               │
//! │          ▼                  ▼                   ▼               │
//! │  ┌──────────────┐   ┌───────────────┐   ┌────────────────┐      │
//! │  │ Synchronizer │   │ Change        │   │ Content        │      │
//! │  │ clone/pull   │──▶│ Detector      │   │ Updater        │      │
//! │  └──────┬───────┘   └───────────────┘   └───────┬────────┘      │
//! │         │                                       │               │
//! │         ▼                                       ▼               │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                    Git Backend (libgit2)                    ││
//! │  │      shallow clone, checkout, fetch, fast-forward, push     ││
//! │  └──────────────────────────┬──────────────────────────────────┘│
//! │                             ▼                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                     Workspace Store                         ││
//! │  │                  <workspace-root>/<job-id>/                 ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All operations are async; libgit2 work runs on tokio's blocking pool.

pub mod config;
pub mod content;
pub mod detect;
pub mod error;
pub mod git;
pub mod job;
pub mod lock;
pub mod storage;
pub mod synchronizer;
pub mod validation;

pub use config::{EngineConfig, Identity};
pub use content::CommitRequest;
pub use detect::{CommitId, SyncResult, SyncSummary};
pub use error::{Error, Result};
pub use job::{JobId, JobSpec};

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

use detect::JobState;
use lock::LockTable;
use storage::WorkspaceStore;

struct Shared {
    config: EngineConfig,
    store: WorkspaceStore,
    locks: LockTable<JobState>,
}

/// The main engine handle
///
/// Cheap to clone; clones share workspaces, locks and observed tips.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    /// Create an engine managing workspaces under `config.workspace_root`
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = WorkspaceStore::new(config.workspace_root.clone());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                store,
                locks: LockTable::new(),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn workspaces(&self) -> &WorkspaceStore {
        &self.shared.store
    }

    /// Workspace directory of a job
    pub fn location_for(&self, job_id: &JobId) -> PathBuf {
        self.shared.store.location_for(job_id)
    }

    /// Bring the job's workspace to the tip of `branch` and report whether
    /// the tip moved since the last observation
    #[tracing::instrument(skip(self), fields(job = %job_id))]
    pub async fn sync(&self, job_id: &JobId, remote_url: &str, branch: &str) -> Result<SyncResult> {
        let guard = self.shared.locks.acquire(job_id).await;
        let shared = Arc::clone(&self.shared);
        let job_id = job_id.clone();
        let remote_url = remote_url.to_string();
        let branch = branch.to_string();

        // The guard moves into the blocking task, so the job stays locked until
        // the git work is done even if this future is dropped.
        let result = tokio::task::spawn_blocking(move || {
            let mut state = guard;
            let after = synchronizer::sync_workspace(
                &shared.store,
                &shared.config,
                &job_id,
                &remote_url,
                &branch,
            )?;

            let result = SyncResult::new(job_id, state.last_tip, after);
            state.last_tip = Some(after);
            Ok::<_, Error>(result)
        })
        .await??;

        tracing::info!(changed = result.changed, after = %result.after, "Sync complete");
        Ok(result)
    }

    /// Sync every job concurrently; one job failing does not stop the others
    pub async fn sync_all(&self, jobs: &[JobSpec]) -> SyncSummary {
        let mut tasks = JoinSet::new();
        for (index, job) in jobs.iter().cloned().enumerate() {
            let engine = self.clone();
            tasks.spawn(async move {
                let outcome = engine.sync(&job.id, &job.url, &job.branch).await;
                (index, job.id, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(jobs.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!(error = %e, "Sync task failed to complete"),
            }
        }
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut summary = SyncSummary::default();
        for (_, job_id, outcome) in outcomes {
            if let Err(e) = &outcome {
                tracing::warn!(job = %job_id, error = %e, "Sync failed");
            }
            summary.record(job_id, outcome);
        }

        tracing::info!("{}", summary.message());
        summary
    }

    /// Write, commit and push one file on the job's tracked branch, returning
    /// the remote URL
    ///
    /// The pushed commit becomes the job's observed tip when nothing else
    /// arrived since the last sync, so the engine's own push does not look
    /// like outside change.
    #[tracing::instrument(skip(self, request), fields(job = %job_id, branch = %request.branch, path = %request.path))]
    pub async fn update(&self, job_id: &JobId, request: CommitRequest) -> Result<String> {
        let guard = self.shared.locks.acquire(job_id).await;
        let shared = Arc::clone(&self.shared);
        let job_id = job_id.clone();

        tokio::task::spawn_blocking(move || {
            let mut state = guard;
            let outcome = content::apply_update(&shared.store, &shared.config, &job_id, &request)?;

            // Outside commits pulled in by the update still need a build, so
            // the tip is only advanced when the update started from it.
            if state.last_tip == Some(outcome.base) {
                state.last_tip = Some(outcome.tip);
            }
            Ok::<_, Error>(outcome.remote_url)
        })
        .await?
    }

    /// Read a file as committed on the tip of the job's local `branch`
    pub async fn read_content(&self, job_id: &JobId, branch: &str, path: &str) -> Result<Vec<u8>> {
        let guard = self.shared.locks.acquire(job_id).await;
        let shared = Arc::clone(&self.shared);
        let job_id = job_id.clone();
        let branch = branch.to_string();
        let path = path.to_string();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            content::read_content(&shared.store, &shared.config, &job_id, &branch, &path)
        })
        .await?
    }

    /// Tip recorded by the last sync or update of a job, if any
    pub async fn last_observed(&self, job_id: &JobId) -> Option<CommitId> {
        self.shared.locks.acquire(job_id).await.last_tip
    }
}
