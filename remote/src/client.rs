use std::sync::Arc;
use std::time::Duration;

use common::fs::FileSystem;

use crate::kerberos::KerberosCredential;

/// Dial and keep-alive timeout, long enough to never trigger in practice
pub const UNBOUNDED_TIMEOUT: Duration = Duration::from_secs(300_000);

/// Authenticated handle bound to one cluster, shared read-only once issued
pub type ClientSession = Arc<dyn FileSystem>;

/// Resolved configuration a [`Connector`] builds a session from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Namenode `host:port` addresses, tried in order
    pub addresses: Vec<String>,
    pub user: String,
    pub use_https: bool,
    pub dial_timeout: Duration,
    pub keep_alive: Duration,
    /// Set when logged in with delegated identity
    pub kerberos: Option<KerberosCredential>,
}

impl ClientOptions {
    pub fn new(user: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            addresses,
            user: user.into(),
            use_https: false,
            dial_timeout: UNBOUNDED_TIMEOUT,
            keep_alive: UNBOUNDED_TIMEOUT,
            kerberos: None,
        }
    }
}

#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ClientOptions) -> anyhow::Result<ClientSession>;
}
