//! The remote filesystem capability
//!
//! Everything rhdfs does to a cluster goes through [`FileSystem`]. The trait is deliberately
//! narrow: status, directory listing, streaming read, streaming create and mkdir. Wire protocol
//! details live in the implementations (see the `remote` crate for WebHDFS and [`crate::memfs`]
//! for the in-memory one).

use std::path::{Path, PathBuf};

/// Fixed mode for directories created by copy operations
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Status of a single remote entry as reported by the filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: PathBuf,
    pub is_dir: bool,
    pub length: u64,
}

/// Errors reported by a [`FileSystem`] implementation.
///
/// "Not found" and "already exists" are split out because callers make decisions based on them,
/// everything else is an opaque fault.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("{0:?}: no such file or directory")]
    NotFound(PathBuf),
    #[error("{0:?}: file already exists")]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type FileReader = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Write stream for a newly created file.
///
/// Data is only guaranteed to be durable once `shutdown` completed successfully.
pub type FileWriter = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;

#[async_trait::async_trait]
pub trait FileSystem: Send + Sync {
    /// Status of `path`, [`FsError::NotFound`] if it's absent
    async fn stat(&self, path: &Path) -> Result<FileStatus, FsError>;

    /// Immediate children of the directory `path`, in no particular order
    async fn list(&self, path: &Path) -> Result<Vec<FileStatus>, FsError>;

    /// Open `path` for reading
    async fn open(&self, path: &Path) -> Result<FileReader, FsError>;

    /// Create a new file at `path`; fails with [`FsError::AlreadyExists`] instead of overwriting
    async fn create(&self, path: &Path) -> Result<FileWriter, FsError>;

    /// Create a single directory; fails with [`FsError::AlreadyExists`] if `path` exists
    async fn mkdir(&self, path: &Path, mode: u32) -> Result<(), FsError>;
}
