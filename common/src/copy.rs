use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::error::Error;
use crate::fs::{DEFAULT_DIR_MODE, FileSystem, FsError};
use crate::walk;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_copied: u64,
    pub files_copied: usize,
    pub directories_created: usize,
    pub directories_unchanged: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            bytes_copied: self.bytes_copied + other.bytes_copied,
            files_copied: self.files_copied + other.files_copied,
            directories_created: self.directories_created + other.directories_created,
            directories_unchanged: self.directories_unchanged + other.directories_unchanged,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            files copied: {}\n\
            directories created: {}\n\
            directories unchanged: {}",
            bytesize::ByteSize(self.bytes_copied),
            self.files_copied,
            self.directories_created,
            self.directories_unchanged,
        )
    }
}

// both streams are released whatever the outcome: the reader is dropped and the writer shut
// down before the first error is returned
async fn transfer(fs: &dyn FileSystem, src: &Path, dst: &Path) -> anyhow::Result<u64> {
    tracing::debug!("opening 'src' for reading and 'dst' for writing");
    let mut reader = fs
        .open(src)
        .await
        .with_context(|| format!("cannot open {src:?} for reading"))?;
    let mut writer = fs
        .create(dst)
        .await
        .with_context(|| format!("cannot create {dst:?}"))?;
    tracing::debug!("copying data");
    let copied = tokio::io::copy(&mut reader, &mut writer).await;
    drop(reader);
    let closed = writer.shutdown().await;
    match (copied, closed) {
        (Ok(bytes_copied), Ok(())) => Ok(bytes_copied),
        // a writer that went away mid-copy explains itself when closed
        (Err(error), Err(closing)) if error.kind() == std::io::ErrorKind::BrokenPipe => {
            Err(closing).with_context(|| format!("failed writing {dst:?}"))
        }
        (Err(error), _) => {
            Err(error).with_context(|| format!("failed copying {src:?} to {dst:?}"))
        }
        (Ok(_), Err(closing)) => Err(closing).with_context(|| format!("failed closing {dst:?}")),
    }
}

/// Stream the contents of `src` into a newly created `dst`
#[instrument(skip(fs))]
pub async fn copy_file(fs: &dyn FileSystem, src: &Path, dst: &Path) -> Result<Summary, Error> {
    let bytes_copied = transfer(fs, src, dst)
        .await
        .map_err(|err| Error::transfer(err, Default::default()))?;
    Ok(Summary {
        bytes_copied,
        files_copied: 1,
        ..Default::default()
    })
}

/// Create the mirror of a source directory, an already existing directory is fine
#[instrument(skip(fs))]
async fn make_dir(fs: &dyn FileSystem, dst: &Path) -> anyhow::Result<Summary> {
    match fs.mkdir(dst, DEFAULT_DIR_MODE).await {
        Ok(()) => Ok(Summary {
            directories_created: 1,
            ..Default::default()
        }),
        Err(FsError::AlreadyExists(_)) => {
            let status = fs
                .stat(dst)
                .await
                .with_context(|| format!("failed reading status of {dst:?}"))?;
            if !status.is_dir {
                return Err(anyhow!(
                    "cannot create directory {dst:?}: a file with that name exists"
                ));
            }
            tracing::debug!("'dst' is a directory, leaving it as is");
            Ok(Summary {
                directories_unchanged: 1,
                ..Default::default()
            })
        }
        Err(error) => Err(error).with_context(|| format!("cannot create directory {dst:?}")),
    }
}

/// Map an entry under `src_root` to the same relative location under `dst_root`
pub fn map_path(entry: &Path, src_root: &Path, dst_root: &Path) -> anyhow::Result<PathBuf> {
    let relative = entry
        .strip_prefix(src_root)
        .with_context(|| format!("{entry:?} is not located under {src_root:?}"))?;
    if relative.as_os_str().is_empty() {
        return Ok(dst_root.to_path_buf());
    }
    Ok(dst_root.join(relative))
}

/// Mirror the tree rooted at `src_root` into `dst_root`.
///
/// Fails fast: the first error aborts the walk and the destination is left partially populated,
/// the returned error carries the summary of what was copied until then.
#[instrument(skip(fs))]
pub async fn copy_tree(
    fs: &dyn FileSystem,
    src_root: &Path,
    dst_root: &Path,
) -> Result<Summary, Error> {
    let mut summary = Summary::default();
    let mut entries = walk::walk(fs, src_root);
    loop {
        let entry = match entries
            .try_next()
            .await
            .with_context(|| format!("failed traversing {src_root:?}"))
        {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => return Err(Error::transfer(err, summary)),
        };
        let dst = map_path(&entry.path, src_root, dst_root)
            .map_err(|err| Error::transfer(err, summary))?;
        if entry.is_dir {
            summary = summary
                + make_dir(fs, &dst)
                    .await
                    .map_err(|err| Error::transfer(err, summary))?;
        } else {
            let bytes_copied = transfer(fs, &entry.path, &dst)
                .await
                .map_err(|err| Error::transfer(err, summary))?;
            summary = summary
                + Summary {
                    bytes_copied,
                    files_copied: 1,
                    ..Default::default()
                };
        }
    }
    Ok(summary)
}
