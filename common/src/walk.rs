//! Lazy pre-order traversal of a remote tree
//!
//! The walk only produces entries; callers apply whatever side effects they need. A directory is
//! listed only when the stream is polled past it, so anything the caller does with a directory
//! entry (e.g. creating its mirror) happens before its children are visited.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use futures::stream::BoxStream;

use crate::fs::{FileStatus, FileSystem, FsError};

struct WalkState<'a> {
    fs: &'a dyn FileSystem,
    root: Option<PathBuf>,
    // directory yielded last, listed on the next poll
    expand: Option<PathBuf>,
    // entries still to visit, next one on top
    pending: Vec<FileStatus>,
}

/// Visit `root` and all of its descendants, directories before their contents.
///
/// Within a directory files are visited first, then subdirectories, each in lexical order. The
/// stream ends after the first error.
pub fn walk<'a>(
    fs: &'a dyn FileSystem,
    root: &Path,
) -> BoxStream<'a, Result<FileStatus, FsError>> {
    let state = WalkState {
        fs,
        root: Some(root.to_path_buf()),
        expand: None,
        pending: Vec::new(),
    };
    futures::stream::try_unfold(state, |mut state| async move {
        if let Some(root) = state.root.take() {
            let status = state.fs.stat(&root).await?;
            state.pending.push(status);
        }
        if let Some(dir) = state.expand.take() {
            let mut children = state.fs.list(&dir).await?;
            // reversed so that popping yields files first, then directories, each ascending
            children.sort_by(|a, b| (b.is_dir, &b.path).cmp(&(a.is_dir, &a.path)));
            state.pending.extend(children);
        }
        match state.pending.pop() {
            Some(entry) => {
                if entry.is_dir {
                    state.expand = Some(entry.path.clone());
                }
                Ok(Some((entry, state)))
            }
            None => Ok(None),
        }
    })
    .boxed()
}
