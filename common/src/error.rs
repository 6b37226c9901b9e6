use crate::copy::Summary;

/// Error type shared by all rhdfs operations.
///
/// Every variant is terminal at the CLI boundary; the binary prints it and exits with status 1.
/// [`Error::Transfer`] keeps the summary of the work done before the failure, the destination
/// tree is left as-is.
///
/// # Logging Convention
/// The Display implementation shows the full error chain:
/// ```ignore
/// tracing::error!("operation failed: {}", &error);   // ✅ Shows full chain
/// tracing::error!("operation failed: {:#}", &error); // ✅ Shows full chain
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed arguments, unsupported wildcards or a directory source without `-r`
    #[error("{0}")]
    Usage(String),
    /// The source path is absent
    #[error("{0}")]
    NotFound(String),
    /// The destination exists with an incompatible type
    #[error("{0}")]
    Conflict(String),
    /// The remote system reported a fault other than "not found"
    #[error("failed reading status of {path:?}: {source:#}")]
    Stat {
        path: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },
    /// Session or authentication setup failed
    #[error("{source:#}")]
    Connect {
        #[source]
        source: anyhow::Error,
    },
    /// Byte transfer or directory creation failed mid-copy
    #[error("{source:#}")]
    Transfer {
        #[source]
        source: anyhow::Error,
        summary: Summary,
    },
}

impl Error {
    #[must_use]
    pub fn connect(source: anyhow::Error) -> Self {
        Error::Connect { source }
    }

    #[must_use]
    pub fn transfer(source: anyhow::Error, summary: Summary) -> Self {
        Error::Transfer { source, summary }
    }

    /// Summary of work completed before the error, empty unless a transfer was under way
    #[must_use]
    pub fn summary(&self) -> Summary {
        match self {
            Error::Transfer { summary, .. } => *summary,
            _ => Summary::default(),
        }
    }

    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }
}
