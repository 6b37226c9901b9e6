use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tracing::instrument;

use crate::error::Error;
use crate::fs::{FileSystem, FsError};

/// Snapshot of a path's state, never cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStatus {
    pub exists: bool,
    pub is_dir: bool,
}

impl PathStatus {
    pub const MISSING: PathStatus = PathStatus {
        exists: false,
        is_dir: false,
    };
}

/// Classify `path`. A missing path is not an error.
#[instrument(skip(fs))]
pub async fn stat(fs: &dyn FileSystem, path: &Path) -> Result<PathStatus, Error> {
    match fs.stat(path).await {
        Ok(status) => Ok(PathStatus {
            exists: true,
            is_dir: status.is_dir,
        }),
        Err(FsError::NotFound(_)) => Ok(PathStatus::MISSING),
        Err(error) => Err(Error::Stat {
            path: path.to_path_buf(),
            source: anyhow!(error),
        }),
    }
}

/// Final path component of `source`, used when nesting under an existing directory
pub fn basename(source: &Path) -> Result<&std::ffi::OsStr, Error> {
    source
        .file_name()
        .ok_or_else(|| Error::Usage(format!("Source path {source:?} does not have a basename")))
}

/// Compute the path a copy of `source` to `destination` will actually write to.
///
/// A missing destination is used verbatim, an existing directory receives the source under its
/// basename (like `cp`), and an existing file is a conflict. The destination's type decides,
/// regardless of whether the source is a file or a directory.
#[instrument(skip(fs))]
pub async fn effective_target(
    fs: &dyn FileSystem,
    source: &Path,
    destination: &Path,
) -> Result<PathBuf, Error> {
    let status = stat(fs, destination).await?;
    if !status.exists {
        tracing::debug!("destination does not exist, using it as is");
        return Ok(destination.to_path_buf());
    }
    if status.is_dir {
        let target = destination.join(basename(source)?);
        tracing::debug!("destination is a directory, copying into {target:?}");
        return Ok(target);
    }
    Err(Error::Conflict(format!(
        "Target {destination:?} already exists and is a file."
    )))
}
