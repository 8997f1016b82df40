//! Job identity
//!
//! A job is one source repository registered by the operator. The engine only
//! needs its id, the remote to mirror, and the branch to track.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::validation::validate_job_id;

/// Validated job identifier, safe to use as a directory name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Parse and validate a job id
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_job_id(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl std::str::FromStr for JobId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Everything the job service supplies to sync one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub url: String,
    pub branch: String,
}

impl JobSpec {
    pub fn new(id: JobId, url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            branch: branch.into(),
        }
    }

    /// Load a YAML list of job specs
    ///
    /// ```yaml
    /// - id: "42"
    ///   url: https://example.com/site.git
    ///   branch: main
    /// ```
    pub fn load_manifest(path: &Path) -> Result<Vec<JobSpec>> {
        let content = std::fs::read_to_string(path).map_err(|e| crate::Error::Config {
            message: format!("cannot read job manifest {}: {}", path.display(), e),
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }
}
