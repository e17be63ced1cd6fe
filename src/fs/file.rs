//! File nodes and the handle they own between open and release.

use std::{
    fs::{File, OpenOptions},
    io,
    os::{
        fd::IntoRawFd,
        unix::fs::{FileExt, OpenOptionsExt},
    },
    path::{Path, PathBuf},
    sync::Arc,
};

use libc::c_int;
use tracing::debug;

use crate::fs::{
    error::{IoResultExt, NodeError, NodeResult},
    node::Describe,
    Config,
};

/// `Unopened -> Open -> Closed`, never back.
#[derive(Debug)]
enum HandleState {
    Unopened,
    Open(File),
    Closed,
}

/// A regular file. Once opened, the node doubles as the handle the host
/// reads and writes through.
#[derive(Debug)]
pub struct FileNode {
    config: Arc<Config>,
    real_path: PathBuf,
    handle: HandleState,
}

impl FileNode {
    pub(crate) fn new(config: Arc<Config>, real_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            real_path: real_path.into(),
            handle: HandleState::Unopened,
        }
    }

    pub(crate) fn with_handle(
        config: Arc<Config>,
        real_path: impl Into<PathBuf>,
        file: File,
    ) -> Self {
        Self {
            config,
            real_path: real_path.into(),
            handle: HandleState::Open(file),
        }
    }

    /// A new, unopened node for the same real path.
    pub fn reopen(&self) -> Self {
        Self::new(Arc::clone(&self.config), self.real_path.clone())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.handle, HandleState::Open(_))
    }

    fn not_open(&self) -> NodeError {
        let state = match self.handle {
            HandleState::Closed => "has already been released",
            _ => "has not been opened",
        };
        NodeError::InternalConsistency(format!("{} {state}", self.real_path.display()))
    }

    fn file(&self) -> NodeResult<&File> {
        match &self.handle {
            HandleState::Open(file) => Ok(file),
            _ => Err(self.not_open()),
        }
    }

    /// Open the real file with the kernel's open flags.
    pub fn open(&mut self, flags: c_int) -> NodeResult<()> {
        debug!(path = %self.real_path.display(), flags, "open");
        if !matches!(self.handle, HandleState::Unopened) {
            return Err(NodeError::InternalConsistency(format!(
                "{} cannot be opened twice",
                self.real_path.display()
            )));
        }

        let file = open_options(flags).open(&self.real_path).at(&self.real_path)?;
        self.handle = HandleState::Open(file);
        Ok(())
    }

    /// Read up to `size` bytes at `offset`. Hitting end of file yields a
    /// shorter buffer rather than an error.
    pub fn read(&self, offset: u64, size: u32) -> NodeResult<Vec<u8>> {
        debug!(path = %self.real_path.display(), offset, size, "read");
        let file = self.file()?;

        let mut buf = vec![0u8; size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(NodeError::from_io(&self.real_path, err)),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Write `data` at `offset` in a single call. A short write is reported
    /// as an error, not retried.
    pub fn write(&self, offset: u64, data: &[u8]) -> NodeResult<usize> {
        debug!(path = %self.real_path.display(), offset, size = data.len(), "write");
        let file = self.file()?;

        let written = file.write_at(data, offset).at(&self.real_path)?;
        if written != data.len() {
            return Err(NodeError::Io {
                path: self.real_path.clone(),
                to: None,
                source: io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {written} of {} bytes", data.len()),
                ),
            });
        }
        Ok(written)
    }

    /// Close the handle. Releasing twice, or releasing a node that was never
    /// opened, is an error.
    pub fn release(&mut self) -> NodeResult<()> {
        debug!(path = %self.real_path.display(), "release");
        let file = match std::mem::replace(&mut self.handle, HandleState::Closed) {
            HandleState::Open(file) => file,
            previous => {
                self.handle = previous;
                return Err(self.not_open());
            }
        };
        let fd = file.into_raw_fd();
        if unsafe { libc::close(fd) } != 0 {
            return Err(NodeError::from_io(
                &self.real_path,
                io::Error::last_os_error(),
            ));
        }
        Ok(())
    }

    /// Truncate or extend the real file to `size` bytes, through the open
    /// handle when there is one.
    pub fn set_len(&self, size: u64) -> NodeResult<()> {
        debug!(path = %self.real_path.display(), size, "set_len");
        match &self.handle {
            HandleState::Open(file) => file.set_len(size).at(&self.real_path),
            _ => OpenOptions::new()
                .write(true)
                .open(&self.real_path)
                .and_then(|file| file.set_len(size))
                .at(&self.real_path),
        }
    }
}

impl Describe for FileNode {
    fn real_path(&self) -> &Path {
        &self.real_path
    }

    fn config(&self) -> &Config {
        &self.config
    }
}

/// Read/write access from the `O_ACCMODE` bits of `flags`.
fn access_mode(flags: c_int) -> (bool, bool) {
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => (false, true),
        libc::O_RDWR => (true, true),
        _ => (true, false),
    }
}

fn open_options(flags: c_int) -> OpenOptions {
    let (read, write) = access_mode(flags);
    let mut opts = OpenOptions::new();
    opts.read(read)
        .write(write)
        .custom_flags(flags & !libc::O_ACCMODE);
    opts
}
