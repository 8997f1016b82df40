//! Input validation for gitsync
//!
//! Job ids become directory names under the workspace root and file paths are
//! joined onto a workspace, so both are checked here to keep every write
//! inside the directory that belongs to the job.

use std::path::{Component, Path};
use thiserror::Error;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid identifier '{0}': {1}")]
    InvalidIdentifier(String, &'static str),

    #[error("Identifier '{0}' is too long (max {1} characters)")]
    TooLong(String, usize),

    #[error("Identifier cannot be empty")]
    Empty,

    #[error("Reserved name: '{0}'")]
    Reserved(String),

    #[error("Invalid path '{0}': {1}")]
    InvalidPath(String, &'static str),

    #[error("Invalid branch name '{0}'")]
    InvalidBranch(String),
}

/// Maximum length for identifiers
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Reserved names that cannot be used
const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul",
    "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8", "com9",
    "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validate a job id
///
/// Rules:
/// - Must be 1-255 characters
/// - Only alphanumeric, underscore, and hyphen allowed
/// - Cannot start with a hyphen or underscore
/// - Cannot be a reserved name (case-insensitive)
pub fn validate_job_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::Empty);
    }

    if id.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong(id.to_string(), MAX_IDENTIFIER_LENGTH));
    }

    for (i, c) in id.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(ValidationError::InvalidIdentifier(
                id.to_string(),
                "contains invalid characters (only alphanumeric, underscore, and hyphen allowed)",
            ));
        }
        if i == 0 && (c == '-' || c == '_') {
            return Err(ValidationError::InvalidIdentifier(
                id.to_string(),
                "cannot start with hyphen or underscore",
            ));
        }
    }

    if RESERVED_NAMES.contains(&id.to_lowercase().as_str()) {
        return Err(ValidationError::Reserved(id.to_string()));
    }

    Ok(())
}

/// Validate a file path that will be written inside a workspace
///
/// The path must be relative, name at least one file, and never climb out of
/// the workspace or reach into the `.git` directory.
pub fn validate_workspace_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::InvalidPath(path.to_string(), "cannot be empty"));
    }

    if path.contains('\\') {
        return Err(ValidationError::InvalidPath(
            path.to_string(),
            "must use forward slashes",
        ));
    }

    let mut normal = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(name) => {
                if normal == 0 && name == ".git" {
                    return Err(ValidationError::InvalidPath(
                        path.to_string(),
                        "cannot point into the git directory",
                    ));
                }
                normal += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ValidationError::InvalidPath(
                    path.to_string(),
                    "contains path traversal components",
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ValidationError::InvalidPath(path.to_string(), "must be relative"));
            }
        }
    }

    if normal == 0 || path.ends_with('/') {
        return Err(ValidationError::InvalidPath(path.to_string(), "must name a file"));
    }

    Ok(())
}

/// Validate a branch name before it is used to build ref names
pub fn validate_branch(branch: &str) -> Result<(), ValidationError> {
    if git2::Branch::name_is_valid(branch).unwrap_or(false) {
        Ok(())
    } else {
        Err(ValidationError::InvalidBranch(branch.to_string()))
    }
}
