//! Storage layer for gitsync
//!
//! Owns the on-disk layout: one git working tree per job under the
//! workspace root.

pub mod workspace;

pub use workspace::WorkspaceStore;
