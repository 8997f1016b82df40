//! Engine configuration
//!
//! The workspace root is always handed to the engine explicitly, so several
//! engines (for example in tests) can run side by side on isolated roots.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default number of commits fetched by the initial shallow clone
pub const DEFAULT_CLONE_DEPTH: u32 = 50;

/// Name and email used for commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub(crate) fn signature(&self) -> std::result::Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new("gitsync", "gitsync@localhost")
    }
}

/// Configuration for an [`Engine`](crate::Engine)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one workspace per job
    pub workspace_root: PathBuf,
    /// History depth for clones and fetches; 0 fetches full history
    pub clone_depth: u32,
    /// Name of the remote every workspace tracks
    pub remote_name: String,
    /// Identity used when neither the caller nor the repository supplies one
    pub default_identity: Identity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: Self::default_root(),
            clone_depth: DEFAULT_CLONE_DEPTH,
            remote_name: "origin".to_string(),
            default_identity: Identity::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            ..Self::default()
        }
    }

    /// `/data/grow/workspaces` on hosts with a `/data` volume, a temp
    /// location otherwise
    pub fn default_root() -> PathBuf {
        if Path::new("/data").is_dir() {
            PathBuf::from("/data/grow/workspaces")
        } else {
            std::env::temp_dir().join("grow").join("workspaces")
        }
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_clone_depth(mut self, depth: u32) -> Self {
        self.clone_depth = depth;
        self
    }

    pub fn with_remote_name(mut self, name: impl Into<String>) -> Self {
        self.remote_name = name.into();
        self
    }

    pub fn with_default_identity(mut self, identity: Identity) -> Self {
        self.default_identity = identity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workspace_root.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "workspace_root cannot be empty".to_string(),
            });
        }
        if git2::Remote::is_valid_name(&self.remote_name) {
            Ok(())
        } else {
            Err(Error::Config {
                message: format!("invalid remote name '{}'", self.remote_name),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new("/srv/workspaces");
        assert_eq!(config.workspace_root, PathBuf::from("/srv/workspaces"));
        assert_eq!(config.clone_depth, 50);
        assert_eq!(config.remote_name, "origin");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_yaml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gitsync.yaml");
        std::fs::write(
            &path,
            "workspace_root: /srv/ws\nclone_depth: 0\ndefault_identity:\n  name: Bot\n  email: bot@example.com\n",
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.workspace_root, PathBuf::from("/srv/ws"));
        assert_eq!(config.clone_depth, 0);
        assert_eq!(config.remote_name, "origin");
        assert_eq!(config.default_identity.name, "Bot");
    }

    #[test]
    fn test_invalid_remote_name() {
        let config = EngineConfig::new("/srv/ws").with_remote_name("bad name");
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }
}
