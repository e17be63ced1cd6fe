//! FUSE adapter that drives the node model from kernel requests.
//!
//! The adapter keeps the kernel's view of node ids (filled by lookups and
//! dropped on forget) and the table of open file handles. Node ids are the
//! real inode numbers, except that the real root's inode and the FUSE root
//! id are swapped. Each id stays bound to one real `(dev, ino)`: an entry on
//! another device whose inode number collides with a known id is refused.

use std::{
    collections::{hash_map::Entry, HashMap},
    ffi::{OsStr, OsString},
    path::Path,
    time::Duration,
};

use fuser::{
    BackgroundSession, FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate,
    ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::{c_int, EBADF, EINVAL, EISDIR, ENOENT, ENOTDIR};
use tracing::{debug, info, warn};

use crate::fs::{
    attr::{NodeKind, VirtualAttr, BLOCK_SIZE},
    DirEntry, DirectoryNode, Describe, FileNode, MagnifyFs, Node, NodeError, NodeResult,
};
use crate::{Error, Result};

const TTL: Duration = Duration::from_secs(1);
const ROOT_ID: u64 = 1;

/// Reply with the errno of a failed step and return.
macro_rules! unwrap {
    ($reply:ident, $op:expr) => {{
        match $op {
            Ok(r) => r,
            Err(errno) => {
                $reply.error(errno);
                return;
            }
        }
    }};
}

fn failed(op: &'static str, err: NodeError) -> c_int {
    if err.is_not_found() {
        debug!(op, error = %err, "request failed");
    } else {
        warn!(op, error = %err, "request failed");
    }
    err.errno()
}

/// Swap the real root inode with the FUSE root id. Applying it twice gives
/// back the original number.
pub fn remap_ino(ino: u64, root_ino: u64) -> u64 {
    if ino == root_ino {
        ROOT_ID
    } else if ino == ROOT_ID {
        root_ino
    } else {
        ino
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

/// One listing row: node id, offset of the next row, type, name.
type ListingRow = (u64, i64, FileType, OsString);

/// Rows of a directory listing after the kernel's `offset`. `.` and `..`
/// come first; each row carries the offset the kernel resumes from.
fn listing(
    ino: u64,
    entries: Vec<DirEntry>,
    offset: i64,
    node_id: impl Fn(u64) -> u64,
) -> Vec<ListingRow> {
    let dots = [".", ".."]
        .into_iter()
        .map(|name| (ino, FileType::Directory, OsString::from(name)));
    let children = entries
        .into_iter()
        .map(|entry| (node_id(entry.ino), file_type(entry.kind), entry.name));

    let skip = usize::try_from(offset).unwrap_or(0);
    dots.chain(children)
        .enumerate()
        .skip(skip)
        .map(|(i, (id, kind, name))| (id, (i + 1) as i64, kind, name))
        .collect()
}

#[derive(Debug)]
struct NodeEntry {
    node: Node,
    /// Real `(dev, ino)` the id was handed out for.
    real: (u64, u64),
    lookups: u64,
}

pub struct MagnifyFuse {
    root_ino: u64,
    nodes: HashMap<u64, NodeEntry>,
    handles: HashMap<u64, FileNode>,
    next_fh: u64,
}

impl MagnifyFuse {
    /// Build the adapter around the root of `fs`. The real root is probed
    /// here, so a missing or unreadable root fails before mounting.
    pub fn new(fs: &MagnifyFs) -> NodeResult<Self> {
        let root = fs.root();
        let attr = root.attr()?;
        if attr.kind != NodeKind::Directory {
            return Err(NodeError::InternalConsistency(format!(
                "{} is not a directory",
                root.real_path().display()
            )));
        }

        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_ID,
            NodeEntry {
                node: Node::Directory(root),
                real: (attr.dev, attr.ino),
                lookups: 0,
            },
        );
        Ok(Self {
            root_ino: attr.ino,
            nodes,
            handles: HashMap::new(),
            next_fh: 1,
        })
    }

    fn node_id(&self, real_ino: u64) -> u64 {
        remap_ino(real_ino, self.root_ino)
    }

    fn file_attr(&self, attr: &VirtualAttr) -> FileAttr {
        FileAttr {
            ino: self.node_id(attr.ino),
            size: attr.size,
            blocks: attr.blocks,
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            crtime: attr.mtime,
            kind: file_type(attr.kind),
            perm: attr.perm(),
            nlink: attr.nlink as u32,
            uid: attr.uid,
            gid: attr.gid,
            rdev: 0,
            blksize: BLOCK_SIZE as u32,
            flags: 0,
        }
    }

    fn node(&self, ino: u64) -> std::result::Result<&Node, c_int> {
        self.nodes.get(&ino).map(|entry| &entry.node).ok_or(ENOENT)
    }

    fn directory(&self, ino: u64) -> std::result::Result<&DirectoryNode, c_int> {
        self.node(ino)?.as_directory().ok_or(ENOTDIR)
    }

    /// The looked-up node, which follows renames, else the open handle the
    /// kernel passed.
    fn describe(&self, ino: u64, fh: Option<u64>) -> std::result::Result<&dyn Describe, c_int> {
        if let Some(entry) = self.nodes.get(&ino) {
            return Ok(&entry.node);
        }
        match fh.and_then(|fh| self.handles.get(&fh)) {
            Some(handle) => Ok(handle),
            None => Err(ENOENT),
        }
    }

    /// Record a node handed to the kernel and return its attributes. A node
    /// id seen before gets the fresh node, provided it is the same real
    /// object; an id already bound to another object fails.
    fn remember(&mut self, node: Node) -> NodeResult<FileAttr> {
        let real = node.attr()?;
        let attr = self.file_attr(&real);
        match self.nodes.entry(attr.ino) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.real != (real.dev, real.ino) {
                    return Err(NodeError::UnsupportedMetadata(format!(
                        "{} (dev {}, ino {}) collides with node id {} held by {}",
                        node.real_path().display(),
                        real.dev,
                        real.ino,
                        attr.ino,
                        entry.node.real_path().display()
                    )));
                }
                entry.node = node;
                entry.lookups += 1;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(NodeEntry {
                    node,
                    real: (real.dev, real.ino),
                    lookups: 1,
                });
            }
        }
        Ok(attr)
    }

    /// Drop `nlookup` kernel references to `ino`. The root is never dropped.
    fn forget_node(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_ID {
            return;
        }
        if let Some(entry) = self.nodes.get_mut(&ino) {
            entry.lookups = entry.lookups.saturating_sub(nlookup);
            if entry.lookups == 0 {
                self.nodes.remove(&ino);
            }
        }
    }

    /// Point the node id of an entry just moved to `name` under `parent` at
    /// its new path. Nodes below a moved directory keep their old paths
    /// until the kernel looks them up again.
    fn refresh_moved(&mut self, parent: u64, name: &OsStr) {
        let Ok(dir) = self.directory(parent) else {
            return;
        };
        let Some((node, attr)) = dir
            .lookup(name)
            .ok()
            .and_then(|node| node.attr().ok().map(|attr| (node, attr)))
        else {
            return;
        };
        let id = self.node_id(attr.ino);
        if let Some(entry) = self.nodes.get_mut(&id) {
            if entry.real == (attr.dev, attr.ino) {
                entry.node = node;
            }
        }
    }

    fn allocate_fh(&mut self, handle: FileNode) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        self.handles.insert(fh, handle);
        fh
    }
}

// these mirror the fuser callbacks, so the argument lists are not ours to shape
#[allow(clippy::too_many_arguments)]
impl Filesystem for MagnifyFuse {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let dir = unwrap!(reply, self.directory(parent));
        let node = unwrap!(reply, dir.lookup(name).map_err(|e| failed("lookup", e)));
        let attr = unwrap!(reply, self.remember(node).map_err(|e| failed("lookup", e)));
        reply.entry(&TTL, &attr, 0);
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.forget_node(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        let node = unwrap!(reply, self.describe(ino, fh));
        let attr = unwrap!(reply, node.attr().map_err(|e| failed("getattr", e)));
        reply.attr(&TTL, &self.file_attr(&attr));
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        if let Some(size) = size {
            let file = match fh.and_then(|fh| self.handles.get(&fh)) {
                Some(handle) => handle,
                None => {
                    let node = unwrap!(reply, self.node(ino));
                    unwrap!(reply, node.as_file().ok_or(EISDIR))
                }
            };
            unwrap!(reply, file.set_len(size).map_err(|e| failed("setattr", e)));
        }

        let node = unwrap!(reply, self.describe(ino, fh));
        if let Some(mode) = mode {
            unwrap!(reply, node.set_mode(mode).map_err(|e| failed("setattr", e)));
        }
        let attr = unwrap!(reply, node.attr().map_err(|e| failed("setattr", e)));
        reply.attr(&TTL, &self.file_attr(&attr));
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let node = unwrap!(reply, self.node(ino));
        let mut handle = unwrap!(reply, node.as_file().ok_or(EISDIR)).reopen();
        unwrap!(reply, handle.open(flags).map_err(|e| failed("open", e)));
        let fh = self.allocate_fh(handle);
        reply.opened(fh, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let handle = unwrap!(reply, self.handles.get(&fh).ok_or(EBADF));
        let offset = unwrap!(reply, u64::try_from(offset).map_err(|_| EINVAL));
        let data = unwrap!(reply, handle.read(offset, size).map_err(|e| failed("read", e)));
        reply.data(&data);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let handle = unwrap!(reply, self.handles.get(&fh).ok_or(EBADF));
        let offset = unwrap!(reply, u64::try_from(offset).map_err(|_| EINVAL));
        let written = unwrap!(reply, handle.write(offset, data).map_err(|e| failed("write", e)));
        reply.written(written as u32);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let mut handle = unwrap!(reply, self.handles.remove(&fh).ok_or(EBADF));
        unwrap!(reply, handle.release().map_err(|e| failed("release", e)));
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let dir = unwrap!(reply, self.directory(ino));
        let entries = unwrap!(reply, dir.read_dir_all().map_err(|e| failed("readdir", e)));

        for (id, next, kind, name) in listing(ino, entries, offset, |ino| self.node_id(ino)) {
            if reply.add(id, next, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let dir = unwrap!(reply, self.directory(parent));
        let handle = unwrap!(
            reply,
            dir.create(name, mode & !umask).map_err(|e| failed("create", e))
        );
        let attr = unwrap!(
            reply,
            self.remember(Node::File(handle.reopen()))
                .map_err(|e| failed("create", e))
        );
        let fh = self.allocate_fh(handle);
        reply.created(&TTL, &attr, 0, fh, 0);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let dir = unwrap!(reply, self.directory(parent));
        let child = unwrap!(
            reply,
            dir.mkdir(name, mode & !umask).map_err(|e| failed("mkdir", e))
        );
        let attr = unwrap!(
            reply,
            self.remember(Node::Directory(child))
                .map_err(|e| failed("mkdir", e))
        );
        reply.entry(&TTL, &attr, 0);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let dir = unwrap!(reply, self.directory(parent));
        unwrap!(reply, dir.remove(name).map_err(|e| failed("unlink", e)));
        reply.ok();
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let dir = unwrap!(reply, self.directory(parent));
        unwrap!(reply, dir.remove(name).map_err(|e| failed("rmdir", e)));
        reply.ok();
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let dir = unwrap!(reply, self.directory(parent));
        let target = unwrap!(reply, self.node(newparent));
        unwrap!(
            reply,
            dir.rename(name, target, newname)
                .map_err(|e| failed("rename", e))
        );
        self.refresh_moved(newparent, newname);
        reply.ok();
    }
}

/// Handle to a running mount. Unmounting happens in [`MountHandle::unmount`]
/// (or when the handle is dropped).
pub struct MountHandle {
    mountpoint: String,
    session: BackgroundSession,
}

impl std::fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountHandle")
            .field("mountpoint", &self.mountpoint)
            .finish()
    }
}

impl MountHandle {
    pub fn mountpoint(&self) -> &str {
        &self.mountpoint
    }

    pub fn unmount(self) {
        info!(mountpoint = %self.mountpoint, "unmounting");
        self.session.join();
    }
}

/// Mount `fs` on `mountpoint` and serve it from a background thread.
pub fn spawn_mount<P: AsRef<Path>>(fs: &MagnifyFs, mountpoint: P) -> Result<MountHandle> {
    let mountpoint = mountpoint.as_ref().to_string_lossy().to_string();
    let adapter = MagnifyFuse::new(fs).map_err(Error::from)?;
    let options = [
        MountOption::FSName("magnifyfs".into()),
        MountOption::DefaultPermissions,
    ];
    let session = fuser::spawn_mount2(adapter, &mountpoint, &options)?;
    info!(%mountpoint, real_root = %fs.config().real_root().display(), "fuse session started");
    Ok(MountHandle {
        mountpoint,
        session,
    })
}
