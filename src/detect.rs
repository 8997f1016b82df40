//! Change detection
//!
//! A job has new work when its branch tip moved since the last sync. The very
//! first sync of a job always counts as changed so its initial build gets
//! scheduled. Nothing but the tip id is compared.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::job::JobId;

/// A commit id observed on a tracked branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(git2::Oid);

impl CommitId {
    pub fn oid(&self) -> git2::Oid {
        self.0
    }
}

impl From<git2::Oid> for CommitId {
    fn from(oid: git2::Oid) -> Self {
        Self(oid)
    }
}

impl std::str::FromStr for CommitId {
    type Err = git2::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        git2::Oid::from_str(s).map(Self)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for CommitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Whether the tip moved between two observations
pub fn detect(before: Option<CommitId>, after: CommitId) -> bool {
    before != Some(after)
}

/// What the engine remembers about a job between calls
#[derive(Debug, Default)]
pub struct JobState {
    /// Tip recorded by the last successful sync or update
    pub last_tip: Option<CommitId>,
}

/// Outcome of one sync attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub job_id: JobId,
    pub before: Option<CommitId>,
    pub after: CommitId,
    pub changed: bool,
}

impl SyncResult {
    pub fn new(job_id: JobId, before: Option<CommitId>, after: CommitId) -> Self {
        Self {
            job_id,
            before,
            after,
            changed: detect(before, after),
        }
    }
}

/// A job whose sync failed during a batch
#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub job_id: JobId,
    pub error: String,
    pub retryable: bool,
}

/// Results of syncing many jobs at once
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub results: Vec<SyncResult>,
    pub failures: Vec<SyncFailure>,
}

impl SyncSummary {
    pub fn record(&mut self, job_id: JobId, outcome: crate::Result<SyncResult>) {
        match outcome {
            Ok(result) => self.results.push(result),
            Err(e) => self.failures.push(SyncFailure {
                job_id,
                retryable: e.is_retryable(),
                error: e.to_string(),
            }),
        }
    }

    /// Jobs whose tip moved and need a build
    pub fn changed(&self) -> Vec<&JobId> {
        self.results
            .iter()
            .filter(|r| r.changed)
            .map(|r| &r.job_id)
            .collect()
    }

    pub fn unchanged(&self) -> Vec<&JobId> {
        self.results
            .iter()
            .filter(|r| !r.changed)
            .map(|r| &r.job_id)
            .collect()
    }

    /// One-line report for operators
    pub fn message(&self) -> String {
        let changed = self.changed().len();
        let mut message = if changed > 0 {
            format!("Refs changed, enqueued builds from {} jobs.", changed)
        } else {
            "No refs changed in any jobs, nothing to build.".to_string()
        };
        if !self.failures.is_empty() {
            message.push_str(&format!(" {} jobs failed to sync.", self.failures.len()));
        }
        message
    }
}
