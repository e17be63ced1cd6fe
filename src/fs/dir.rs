//! Directory nodes: name resolution, listing and entry management.

use std::{
    ffi::{OsStr, OsString},
    fs::{self, DirBuilder, OpenOptions},
    io,
    os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use crate::fs::{
    attr::NodeKind,
    error::{IoResultExt, NodeError, NodeResult},
    file::FileNode,
    node::{Describe, Node},
    Config,
};

/// One entry produced by [`DirectoryNode::read_dir_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub ino: u64,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct DirectoryNode {
    config: Arc<Config>,
    real_path: PathBuf,
}

impl DirectoryNode {
    pub(crate) fn new(config: Arc<Config>, real_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            real_path: real_path.into(),
        }
    }

    /// Join a single entry name onto this directory. Names that would escape
    /// the directory (`..`, absolute paths, embedded separators) are refused.
    fn child_path(&self, name: &OsStr) -> NodeResult<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == name => {
                Ok(self.real_path.join(name))
            }
            _ => Err(NodeError::InternalConsistency(format!(
                "invalid entry name {:?} under {}",
                name,
                self.real_path.display()
            ))),
        }
    }

    /// Resolve `name` to a fresh node. Directories become directory nodes,
    /// everything else (symlinks are followed) becomes an unopened file node.
    pub fn lookup(&self, name: &OsStr) -> NodeResult<Node> {
        let path = self.child_path(name)?;
        debug!(dir = %self.real_path.display(), name = ?name, "lookup");

        let meta = fs::metadata(&path).at(&path)?;
        if meta.is_dir() {
            Ok(Node::Directory(DirectoryNode::new(
                Arc::clone(&self.config),
                path,
            )))
        } else {
            Ok(Node::File(FileNode::new(Arc::clone(&self.config), path)))
        }
    }

    /// List every entry of the real directory.
    ///
    /// All or nothing: if the metadata of any single entry cannot be read,
    /// the whole listing fails with an I/O error, even when the entry simply
    /// vanished in between. Entries that are neither directories nor regular
    /// files (symlinks, devices, sockets) are reported as files.
    pub fn read_dir_all(&self) -> NodeResult<Vec<DirEntry>> {
        debug!(dir = %self.real_path.display(), "read_dir_all");

        fs::read_dir(&self.real_path)
            .at(&self.real_path)?
            .map(|entry| {
                let entry = entry.at(&self.real_path)?;
                let path = entry.path();
                let meta = entry
                    .metadata()
                    .map_err(|err| listing_failure(&path, err))?;
                if meta.ino() == 0 {
                    return Err(NodeError::UnsupportedMetadata(format!(
                        "no inode number for {}",
                        path.display()
                    )));
                }
                let kind = if meta.is_dir() {
                    NodeKind::Directory
                } else {
                    NodeKind::File
                };
                Ok(DirEntry {
                    name: entry.file_name(),
                    ino: meta.ino(),
                    kind,
                })
            })
            .collect()
    }

    /// Delete a file or an empty directory.
    pub fn remove(&self, name: &OsStr) -> NodeResult<()> {
        let path = self.child_path(name)?;
        debug!(path = %path.display(), "remove");

        let meta = fs::symlink_metadata(&path).at(&path)?;
        if meta.is_dir() {
            fs::remove_dir(&path).at(&path)
        } else {
            fs::remove_file(&path).at(&path)
        }
    }

    /// Rename `old_name` in this directory to `new_name` in `new_dir`.
    ///
    /// `new_dir` must be a directory node. The move is a plain `rename(2)`,
    /// with whatever atomicity the real filesystem gives.
    pub fn rename(&self, old_name: &OsStr, new_dir: &Node, new_name: &OsStr) -> NodeResult<()> {
        let target = new_dir.as_directory().ok_or_else(|| {
            NodeError::InternalConsistency(format!(
                "rename target {} is not a directory node",
                new_dir.real_path().display()
            ))
        })?;
        let old_path = self.child_path(old_name)?;
        let new_path = target.child_path(new_name)?;
        debug!(from = %old_path.display(), to = %new_path.display(), "rename");

        fs::rename(&old_path, &new_path)
            .map_err(|err| NodeError::from_io_between(&old_path, &new_path, err))
    }

    /// Create (or truncate) a regular file and return it already open for
    /// reading and writing. The returned node is also the handle.
    pub fn create(&self, name: &OsStr, mode: u32) -> NodeResult<FileNode> {
        let path = self.child_path(name)?;
        debug!(path = %path.display(), mode, "create");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode & 0o7777)
            .open(&path)
            .at(&path)?;

        Ok(FileNode::with_handle(Arc::clone(&self.config), path, file))
    }

    pub fn mkdir(&self, name: &OsStr, mode: u32) -> NodeResult<DirectoryNode> {
        let path = self.child_path(name)?;
        debug!(path = %path.display(), mode, "mkdir");

        DirBuilder::new()
            .mode(mode & 0o7777)
            .create(&path)
            .at(&path)?;

        Ok(DirectoryNode::new(Arc::clone(&self.config), path))
    }
}

/// The directory itself was readable, so a failing entry never reports as
/// a missing path.
fn listing_failure(path: &Path, err: io::Error) -> NodeError {
    NodeError::Io {
        path: path.to_path_buf(),
        to: None,
        source: io::Error::new(io::ErrorKind::Other, err),
    }
}

impl Describe for DirectoryNode {
    fn real_path(&self) -> &Path {
        &self.real_path
    }

    fn config(&self) -> &Config {
        &self.config
    }
}
