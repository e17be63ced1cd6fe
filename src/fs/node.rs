//! The polymorphic node handed out to the host adapter.
//!
//! Nodes carry no identity beyond their real path: every lookup builds a
//! fresh value, and nothing maps real paths back to live nodes. Two nodes for
//! the same path are fully independent, and a rename does not update nodes
//! that still refer to the old path.

use std::{fs, os::unix::fs::PermissionsExt, path::Path};

use tracing::debug;

use crate::fs::{
    attr::{translate, NodeKind, RealMetadata, VirtualAttr},
    dir::DirectoryNode,
    error::{IoResultExt, NodeResult},
    file::FileNode,
    Config,
};

/// Capability shared by both node variants.
pub trait Describe {
    fn real_path(&self) -> &Path;

    fn config(&self) -> &Config;

    /// Probe the real path and translate its metadata. Nothing is cached, so
    /// two calls on an unchanged path return identical attributes.
    fn attr(&self) -> NodeResult<VirtualAttr> {
        debug!(path = %self.real_path().display(), "attr");
        let meta = RealMetadata::probe(self.real_path())?;
        translate(&meta, self.config().coefficient())
    }

    /// Replace the permission bits of the real entry.
    fn set_mode(&self, mode: u32) -> NodeResult<()> {
        let path = self.real_path();
        debug!(path = %path.display(), mode, "set_mode");
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777)).at(path)
    }
}

#[derive(Debug)]
pub enum Node {
    Directory(DirectoryNode),
    File(FileNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Directory(_) => NodeKind::Directory,
            Node::File(_) => NodeKind::File,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    pub fn into_directory(self) -> Option<DirectoryNode> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<FileNode> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    fn describe(&self) -> &dyn Describe {
        match self {
            Node::Directory(dir) => dir,
            Node::File(file) => file,
        }
    }
}

impl Describe for Node {
    fn real_path(&self) -> &Path {
        self.describe().real_path()
    }

    fn config(&self) -> &Config {
        self.describe().config()
    }
}
