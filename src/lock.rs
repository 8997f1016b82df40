//! Per-job lock table
//!
//! One async mutex per job id, created on first use and kept for the life of
//! the table. Holding the guard is holding the job: sync, update and read all
//! take it, so two operations never touch the same workspace at once while
//! different jobs proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::job::JobId;

/// Exclusive access to one job's state; dropping it releases the job
pub type JobGuard<T> = OwnedMutexGuard<T>;

/// Map from job id to a lock guarding that job's state
#[derive(Debug)]
pub struct LockTable<T> {
    slots: Mutex<HashMap<JobId, Arc<AsyncMutex<T>>>>,
}

impl<T: Default> LockTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until `job_id` is free and take it
    pub async fn acquire(&self, job_id: &JobId) -> JobGuard<T> {
        self.slot(job_id).lock_owned().await
    }

    /// Take `job_id` only if no other operation holds it
    pub fn try_acquire(&self, job_id: &JobId) -> Option<JobGuard<T>> {
        self.slot(job_id).try_lock_owned().ok()
    }

    /// Number of jobs seen so far
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, job_id: &JobId) -> Arc<AsyncMutex<T>> {
        // The table lock is only held for the map lookup, never across an await.
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(job_id.clone()).or_default())
    }
}

impl<T: Default> Default for LockTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
