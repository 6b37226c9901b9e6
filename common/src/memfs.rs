//! In-memory [`FileSystem`] implementation
//!
//! Keeps a flat map of absolute paths to nodes and an ordered log of every mutation it performs.
//! Faults can be injected per path, which makes it the stub filesystem of choice for testing the
//! copy and session layers without a cluster.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use anyhow::anyhow;

use crate::fs::{FileReader, FileStatus, FileSystem, FileWriter, FsError};

/// A mutation applied to a [`MemFs`], in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Mkdir(PathBuf),
    Create(PathBuf),
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<PathBuf, Node>,
    mutations: Vec<Mutation>,
    // open/create/mkdir on these paths fail
    faulty: HashSet<PathBuf>,
    // stat/list on these paths fail
    faulty_status: HashSet<PathBuf>,
    // reads of these files fail once the given number of bytes was returned
    read_faults: HashMap<PathBuf, usize>,
    // writes to these files fail with a broken pipe, closing them reports the rejection
    rejected_uploads: HashSet<PathBuf>,
    open_readers: usize,
    unclosed_writers: BTreeSet<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MemFs {
    inner: Arc<Mutex<Inner>>,
}

// poisoning is ignored, the state stays usable after a panic in another test thread
fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Empty filesystem containing only the root directory
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.nodes.insert(PathBuf::from("/"), Node::Dir);
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn add_parents(inner: &mut Inner, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            inner
                .nodes
                .entry(ancestor.to_path_buf())
                .or_insert(Node::Dir);
        }
    }

    /// Add a directory (and any missing parents) without recording a mutation
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut inner = lock(&self.inner);
        Self::add_parents(&mut inner, path);
        inner.nodes.insert(path.to_path_buf(), Node::Dir);
    }

    /// Add a file (and any missing parents) without recording a mutation
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut inner = lock(&self.inner);
        Self::add_parents(&mut inner, path);
        inner
            .nodes
            .insert(path.to_path_buf(), Node::File(contents.into()));
    }

    /// Make open/create/mkdir of `path` fail
    pub fn inject_fault(&self, path: impl AsRef<Path>) {
        let mut inner = lock(&self.inner);
        inner.faulty.insert(path.as_ref().to_path_buf());
    }

    /// Make reading `path` fail after `after` bytes were returned
    pub fn inject_read_fault(&self, path: impl AsRef<Path>, after: usize) {
        let mut inner = lock(&self.inner);
        inner.read_faults.insert(path.as_ref().to_path_buf(), after);
    }

    /// Make the file created at `path` refuse its data, the way a datanode drops an upload
    pub fn reject_upload(&self, path: impl AsRef<Path>) {
        let mut inner = lock(&self.inner);
        inner.rejected_uploads.insert(path.as_ref().to_path_buf());
    }

    /// Readers handed out by `open` and not dropped yet
    pub fn open_readers(&self) -> usize {
        lock(&self.inner).open_readers
    }

    /// Files created but not shut down yet
    pub fn unclosed_writers(&self) -> Vec<PathBuf> {
        lock(&self.inner).unclosed_writers.iter().cloned().collect()
    }

    /// Make stat/list of `path` fail with something other than "not found"
    pub fn inject_status_fault(&self, path: impl AsRef<Path>) {
        let mut inner = lock(&self.inner);
        inner.faulty_status.insert(path.as_ref().to_path_buf());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let inner = lock(&self.inner);
        match inner.nodes.get(path.as_ref()) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        let inner = lock(&self.inner);
        matches!(inner.nodes.get(path.as_ref()), Some(Node::Dir))
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        let inner = lock(&self.inner);
        inner.nodes.contains_key(path.as_ref())
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        let inner = lock(&self.inner);
        inner.mutations.clone()
    }

    fn status(path: &Path, node: &Node) -> FileStatus {
        match node {
            Node::Dir => FileStatus {
                path: path.to_path_buf(),
                is_dir: true,
                length: 0,
            },
            Node::File(data) => FileStatus {
                path: path.to_path_buf(),
                is_dir: false,
                length: data.len() as u64,
            },
        }
    }

    // the parent of a new entry must be an existing directory
    fn check_parent(inner: &Inner, path: &Path) -> Result<(), FsError> {
        let parent = path
            .parent()
            .ok_or_else(|| FsError::AlreadyExists(path.to_path_buf()))?;
        match inner.nodes.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(FsError::Other(anyhow!("{parent:?} is not a directory"))),
            None => Err(FsError::NotFound(parent.to_path_buf())),
        }
    }

    fn check_fault(faults: &HashSet<PathBuf>, path: &Path) -> Result<(), FsError> {
        if faults.contains(path) {
            return Err(FsError::Other(anyhow!("injected fault on {path:?}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FileSystem for MemFs {
    async fn stat(&self, path: &Path) -> Result<FileStatus, FsError> {
        let inner = lock(&self.inner);
        Self::check_fault(&inner.faulty_status, path)?;
        inner
            .nodes
            .get(path)
            .map(|node| Self::status(path, node))
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))
    }

    async fn list(&self, path: &Path) -> Result<Vec<FileStatus>, FsError> {
        let inner = lock(&self.inner);
        Self::check_fault(&inner.faulty_status, path)?;
        match inner.nodes.get(path) {
            Some(Node::Dir) => Ok(inner
                .nodes
                .iter()
                .filter(|(child, _)| child.parent() == Some(path))
                .map(|(child, node)| Self::status(child, node))
                .collect()),
            Some(Node::File(_)) => Err(FsError::Other(anyhow!("{path:?} is not a directory"))),
            None => Err(FsError::NotFound(path.to_path_buf())),
        }
    }

    async fn open(&self, path: &Path) -> Result<FileReader, FsError> {
        let mut inner = lock(&self.inner);
        Self::check_fault(&inner.faulty, path)?;
        match inner.nodes.get(path) {
            Some(Node::File(data)) => {
                let reader = MemReader {
                    inner: self.inner.clone(),
                    path: path.to_path_buf(),
                    data: data.clone(),
                    position: 0,
                    fail_at: inner.read_faults.get(path).copied(),
                };
                inner.open_readers += 1;
                Ok(Box::new(reader))
            }
            Some(Node::Dir) => Err(FsError::Other(anyhow!("{path:?} is a directory"))),
            None => Err(FsError::NotFound(path.to_path_buf())),
        }
    }

    async fn create(&self, path: &Path) -> Result<FileWriter, FsError> {
        let mut inner = lock(&self.inner);
        Self::check_fault(&inner.faulty, path)?;
        if inner.nodes.contains_key(path) {
            return Err(FsError::AlreadyExists(path.to_path_buf()));
        }
        Self::check_parent(&inner, path)?;
        inner
            .nodes
            .insert(path.to_path_buf(), Node::File(Vec::new()));
        inner.mutations.push(Mutation::Create(path.to_path_buf()));
        inner.unclosed_writers.insert(path.to_path_buf());
        Ok(Box::new(MemWriter {
            inner: self.inner.clone(),
            path: path.to_path_buf(),
            rejected: inner.rejected_uploads.contains(path),
        }))
    }

    async fn mkdir(&self, path: &Path, _mode: u32) -> Result<(), FsError> {
        let mut inner = lock(&self.inner);
        Self::check_fault(&inner.faulty, path)?;
        if inner.nodes.contains_key(path) {
            return Err(FsError::AlreadyExists(path.to_path_buf()));
        }
        Self::check_parent(&inner, path)?;
        inner.nodes.insert(path.to_path_buf(), Node::Dir);
        inner.mutations.push(Mutation::Mkdir(path.to_path_buf()));
        Ok(())
    }
}

struct MemReader {
    inner: Arc<Mutex<Inner>>,
    path: PathBuf,
    data: Vec<u8>,
    position: usize,
    fail_at: Option<usize>,
}

impl tokio::io::AsyncRead for MemReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if let Some(fail_at) = self.fail_at
            && self.position >= fail_at
        {
            return Poll::Ready(Err(std::io::Error::other(format!(
                "injected read fault on {:?}",
                self.path
            ))));
        }
        let end = self.fail_at.unwrap_or(usize::MAX).min(self.data.len());
        let n = buf.remaining().min(end - self.position);
        buf.put_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Poll::Ready(Ok(()))
    }
}

impl Drop for MemReader {
    fn drop(&mut self) {
        lock(&self.inner).open_readers -= 1;
    }
}

struct MemWriter {
    inner: Arc<Mutex<Inner>>,
    path: PathBuf,
    rejected: bool,
}

impl tokio::io::AsyncWrite for MemWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.rejected {
            return Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()));
        }
        let mut inner = lock(&self.inner);
        match inner.nodes.get_mut(&self.path) {
            Some(Node::File(data)) => {
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{:?} was removed while being written", self.path),
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        lock(&self.inner).unclosed_writers.remove(&self.path);
        if self.rejected {
            return Poll::Ready(Err(std::io::Error::other(format!(
                "upload of {:?} was rejected",
                self.path
            ))));
        }
        Poll::Ready(Ok(()))
    }
}
