//! Command line path normalization
//!
//! Paths are either plain remote paths (absolute, or relative to the acting user's home
//! directory `/user/<name>`) or `hdfs://host:port/path` URLs naming the cluster explicitly.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;

use common::Error;

static HDFS_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^hdfs://(?P<endpoint>[^/]*)(?P<path>/.*)?$")
        .expect("Failed to compile hdfs url regex")
});

const GLOB_CHARS: [char; 3] = ['*', '?', '['];

/// A command line path split into its cluster and its (possibly relative) path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    /// Empty for the default cluster
    pub endpoint: String,
    pub path: String,
}

pub fn parse_location(raw: &str) -> RemoteLocation {
    match HDFS_URL_REGEX.captures(raw) {
        Some(captures) => RemoteLocation {
            endpoint: captures["endpoint"].to_string(),
            path: captures
                .name("path")
                .map_or("/", |path| path.as_str())
                .to_string(),
        },
        None => RemoteLocation {
            endpoint: String::new(),
            path: raw.to_string(),
        },
    }
}

#[must_use]
pub fn is_glob(raw: &str) -> bool {
    raw.contains(GLOB_CHARS)
}

/// Resolve `.` and `..` lexically, the result is always absolute
#[must_use]
pub fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(name) => cleaned.push(name),
            Component::ParentDir => {
                cleaned.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    cleaned
}

#[must_use]
pub fn home_dir(user: &str) -> PathBuf {
    Path::new("/user").join(user)
}

/// Source and destination of a copy, both on the cluster named by `endpoint`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPlan {
    pub endpoint: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Turn the raw `cp` arguments into a [`CopyPlan`].
///
/// `acting_user` is only consulted when one of the paths is relative.
pub fn normalize<F>(raw_paths: &[String], acting_user: F) -> Result<CopyPlan, Error>
where
    F: FnOnce() -> anyhow::Result<String>,
{
    let [source, destination] = raw_paths else {
        return Err(Error::Usage(
            "Only a source and a destination are required.".to_string(),
        ));
    };
    if is_glob(source) || is_glob(destination) {
        return Err(Error::Usage("Glob is not supported right now.".to_string()));
    }
    let source = parse_location(source);
    let destination = parse_location(destination);
    if source.endpoint != destination.endpoint {
        return Err(Error::Usage(format!(
            "Source and destination must be on the same cluster, got {:?} and {:?}.",
            source.endpoint, destination.endpoint
        )));
    }
    let home = if source.path.starts_with('/') && destination.path.starts_with('/') {
        PathBuf::from("/")
    } else {
        let user = acting_user()
            .context("failed to determine the acting user")
            .map_err(Error::connect)?;
        home_dir(&user)
    };
    Ok(CopyPlan {
        endpoint: source.endpoint,
        source: clean(&home.join(&source.path)),
        destination: clean(&home.join(&destination.path)),
    })
}
