//! Translation of real filesystem metadata into the attributes reported by
//! the mount.
//!
//! The only distortion is the size of non-directory entries, which is
//! multiplied by the configured coefficient and truncated toward zero.
//! Directory sizes are bookkeeping values of the real filesystem and pass
//! through untouched.

use std::{
    fs,
    os::unix::fs::MetadataExt,
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::fs::error::{IoResultExt, NodeError, NodeResult};

/// Block size used to derive the reported block count.
pub const BLOCK_SIZE: u64 = 512;

/// Coarse entry type. Anything that is not a directory is reported as a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// The slice of real metadata the translator consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealMetadata {
    pub kind: NodeKind,
    pub size: u64,
    pub mode: u32,
    pub dev: u64,
    pub ino: u64,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl RealMetadata {
    /// Stat `path` on the real filesystem, following symlinks.
    pub fn probe(path: &Path) -> NodeResult<Self> {
        let meta = fs::metadata(path).at(path)?;
        Ok(Self::from(&meta))
    }
}

impl From<&fs::Metadata> for RealMetadata {
    fn from(meta: &fs::Metadata) -> Self {
        let kind = if meta.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };
        Self {
            kind,
            size: meta.size(),
            mode: meta.mode(),
            dev: meta.dev(),
            ino: meta.ino(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            atime: unix_time(meta.atime(), meta.atime_nsec()),
            mtime: unix_time(meta.mtime(), meta.mtime_nsec()),
            ctime: unix_time(meta.ctime(), meta.ctime_nsec()),
        }
    }
}

/// Attributes reported for a node. Built fresh on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAttr {
    /// Device of the real entry; `(dev, ino)` identifies the real object.
    pub dev: u64,
    pub ino: u64,
    pub kind: NodeKind,
    pub size: u64,
    pub blocks: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl VirtualAttr {
    /// Permission bits only (no file type bits).
    pub fn perm(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }
}

/// Scale a real byte count. Truncates toward zero; saturates at the `u64`
/// bounds (negative or NaN products become 0).
pub fn magnify_size(size: u64, coefficient: f64) -> u64 {
    (size as f64 * coefficient) as u64
}

/// Map real metadata to virtual attributes.
///
/// Fails only when the real filesystem does not provide a usable inode
/// number, since the mount reuses real inode numbers as its own.
pub fn translate(meta: &RealMetadata, coefficient: f64) -> NodeResult<VirtualAttr> {
    if meta.ino == 0 {
        return Err(NodeError::UnsupportedMetadata(
            "real filesystem reported inode 0".into(),
        ));
    }

    let size = match meta.kind {
        NodeKind::Directory => meta.size,
        NodeKind::File => magnify_size(meta.size, coefficient),
    };

    Ok(VirtualAttr {
        dev: meta.dev,
        ino: meta.ino,
        kind: meta.kind,
        size,
        blocks: size.div_ceil(BLOCK_SIZE),
        mode: meta.mode,
        nlink: meta.nlink,
        uid: meta.uid,
        gid: meta.gid,
        atime: meta.atime,
        mtime: meta.mtime,
        ctime: meta.ctime,
    })
}

fn unix_time(secs: i64, nsec: i64) -> SystemTime {
    let nsec = nsec.clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsec)
    } else {
        UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0) + Duration::new(0, nsec)
    }
}
