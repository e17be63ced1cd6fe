//! Filesystem core for magnifyfs.
//!
//! Mirrors a real directory tree through a node model (directory and file
//! nodes over real paths) and reports regular-file sizes multiplied by a
//! coefficient. The FUSE adapter in [`fuse`] drives the nodes.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{Error, Result};

pub mod attr;
pub mod dir;
pub mod error;
pub mod file;
pub mod fuse;
pub mod node;

pub use attr::{NodeKind, VirtualAttr};
pub use dir::{DirEntry, DirectoryNode};
pub use error::{NodeError, NodeResult};
pub use file::FileNode;
pub use node::{Describe, Node};

/// Process-wide settings shared read-only by every node.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    real_root: PathBuf,
    coefficient: f64,
}

impl Config {
    /// The coefficient must be finite and strictly positive. The real root
    /// is not checked here; it fails on first use if it is not a directory.
    pub fn new(real_root: impl Into<PathBuf>, coefficient: f64) -> Result<Self> {
        if !coefficient.is_finite() || coefficient <= 0.0 {
            return Err(Error::InvalidCoefficient(coefficient.to_string()).into());
        }

        Ok(Self {
            real_root: real_root.into(),
            coefficient,
        })
    }

    pub fn real_root(&self) -> &Path {
        &self.real_root
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }
}

/// Entry point of the node model: owns the configuration and hands out the
/// root directory node.
#[derive(Debug, Clone)]
pub struct MagnifyFs {
    config: Arc<Config>,
}

impl MagnifyFs {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> DirectoryNode {
        DirectoryNode::new(Arc::clone(&self.config), self.config.real_root.clone())
    }
}

#[derive(Debug, Clone)]
pub struct MountTarget {
    pub path: PathBuf,
}

impl MountTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn validate_dir(&self) -> Result<()> {
        if !self.path.is_dir() {
            return Err(Error::InvalidTargetDir(self.path.display().to_string()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountSessionState {
    Starting,
    Ready,
    Failed,
    Unmounted,
}

#[derive(Debug, Clone)]
pub struct MountSession {
    pub mount_id: uuid::Uuid,
    pub real_root: PathBuf,
    pub mount_path: PathBuf,
    pub started_at: std::time::SystemTime,
    pub ended_at: Option<std::time::SystemTime>,
    pub state: MountSessionState,
    pub error: Option<String>,
}

impl MountSession {
    pub fn new(real_root: impl AsRef<Path>, mount_path: impl AsRef<Path>) -> Self {
        Self {
            mount_id: uuid::Uuid::new_v4(),
            real_root: real_root.as_ref().to_path_buf(),
            mount_path: mount_path.as_ref().to_path_buf(),
            started_at: std::time::SystemTime::now(),
            ended_at: None,
            state: MountSessionState::Starting,
            error: None,
        }
    }

    pub fn mark_ready(&mut self) {
        self.state = MountSessionState::Ready;
    }

    pub fn mark_failed(&mut self, msg: impl Into<String>) {
        self.state = MountSessionState::Failed;
        self.error = Some(msg.into());
        self.ended_at = Some(std::time::SystemTime::now());
    }

    pub fn mark_unmounted(&mut self) {
        self.state = MountSessionState::Unmounted;
        self.ended_at = Some(std::time::SystemTime::now());
    }
}
