//! Error taxonomy for node operations.
//!
//! Every failure coming back from the real filesystem is classified into one
//! of four kinds and handed straight to the host adapter, which turns it into
//! an errno with [`NodeError::errno`].

use std::{
    io,
    path::{Path, PathBuf},
};

use libc::{c_int, EIO, ENOENT};
use thiserror::Error;

pub type NodeResult<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    /// The real path does not exist (any more). `to` is set for two-path
    /// operations such as rename.
    #[error("no such entry: {}", subject(.path, .to.as_deref()))]
    NotFound { path: PathBuf, to: Option<PathBuf> },
    /// Any other failure reported by the real filesystem.
    #[error("i/o error on {}: {source}", subject(.path, .to.as_deref()))]
    Io {
        path: PathBuf,
        to: Option<PathBuf>,
        #[source]
        source: io::Error,
    },
    #[error("unsupported metadata: {0}")]
    UnsupportedMetadata(String),
    /// The caller handed us a node of the wrong variant or a handle in the
    /// wrong state.
    #[error("internal consistency: {0}")]
    InternalConsistency(String),
}

impl NodeError {
    /// Classify an error returned for an operation on `path`.
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::classify(path.into(), None, source)
    }

    /// Classify an error returned for an operation from `from` to `to`.
    pub fn from_io_between(
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::classify(from.into(), Some(to.into()), source)
    }

    fn classify(path: PathBuf, to: Option<PathBuf>, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            NodeError::NotFound { path, to }
        } else {
            NodeError::Io { path, to, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NodeError::NotFound { .. })
    }

    /// Errno reported to the kernel for this error.
    pub fn errno(&self) -> c_int {
        match self {
            NodeError::NotFound { .. } => ENOENT,
            NodeError::Io { source, .. } => source.raw_os_error().unwrap_or(EIO),
            NodeError::UnsupportedMetadata(_) | NodeError::InternalConsistency(_) => EIO,
        }
    }
}

fn subject(path: &Path, to: Option<&Path>) -> String {
    match to {
        Some(to) => format!("{} -> {}", path.display(), to.display()),
        None => path.display().to_string(),
    }
}

/// Attach the real path to an `io::Result`, classifying the error.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> NodeResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> NodeResult<T> {
        self.map_err(|err| NodeError::from_io(path, err))
    }
}
