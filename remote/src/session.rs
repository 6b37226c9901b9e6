//! Authenticated session acquisition and caching
//!
//! [`SessionManager`] hands out one [`ClientSession`] per endpoint key for the lifetime of the
//! process. The first request for a key resolves the acting identity, logs in with delegated
//! identity when a configuration directory is present (retrying with linear backoff), and asks
//! the [`Connector`] for a session. Later requests return the cached one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::instrument;

use common::Error;

use crate::client::{ClientOptions, ClientSession, Connector};
use crate::hadoop_conf::{self, ClusterConfig};
use crate::identity;
use crate::kerberos::{Authenticator, KerberosCredential, Kinit};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper, retry};

pub const DEFAULT_CONF_DIR: &str = "hdfs_conf";
pub const NAMENODE_ENV: &str = "HADOOP_NAMENODE";

/// Settings read once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Presence of this directory switches to delegated identity
    pub conf_dir: PathBuf,
    pub user_override: Option<String>,
    /// Namenode addresses separated by `_`
    pub namenode_override: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            conf_dir: PathBuf::from(DEFAULT_CONF_DIR),
            user_override: None,
            namenode_override: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Read `HADOOP_USER_NAME` and `HADOOP_NAMENODE`, empty values count as unset
    pub fn from_env(conf_dir: Option<PathBuf>) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());
        Self {
            conf_dir: conf_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CONF_DIR)),
            user_override: var(identity::USER_ENV),
            namenode_override: var(NAMENODE_ENV),
            retry: RetryPolicy::default(),
        }
    }

    fn addresses(&self) -> Vec<String> {
        self.namenode_override
            .as_deref()
            .unwrap_or_default()
            .split('_')
            .filter(|address| !address.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// anything but a definite "not found" counts as present, a broken directory then fails loudly
// during login instead of silently falling back to ambient identity
async fn conf_dir_present(conf_dir: &Path) -> bool {
    match tokio::fs::metadata(conf_dir).await {
        Ok(_) => true,
        Err(error) => error.kind() != std::io::ErrorKind::NotFound,
    }
}

pub struct SessionManager {
    config: SessionConfig,
    connector: Box<dyn Connector>,
    authenticator: Box<dyn Authenticator>,
    sleeper: Box<dyn Sleeper>,
    // held across lookup, creation and insertion so a key is never connected twice
    sessions: tokio::sync::Mutex<HashMap<String, ClientSession>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Manager logging in with `kinit` and sleeping on the tokio timer
    pub fn new(config: SessionConfig, connector: Box<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            authenticator: Box::new(Kinit::default()),
            sleeper: Box::new(TokioSleeper),
            sessions: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Box<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn acting_user(&self) -> anyhow::Result<String> {
        identity::acting_user(self.config.user_override.as_deref())
    }

    /// Session for `endpoint_key`, created on first use.
    ///
    /// An empty key stands for the default cluster, any other key is the authority of an
    /// `hdfs://` URL. Only the host of that authority is used, on the WebHDFS port.
    #[instrument(skip(self))]
    pub async fn get_session(&self, endpoint_key: &str) -> Result<ClientSession, Error> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(endpoint_key) {
            tracing::debug!("reusing cached session");
            return Ok(session.clone());
        }
        let session = self
            .create_session(endpoint_key)
            .await
            .map_err(Error::connect)?;
        sessions.insert(endpoint_key.to_string(), session.clone());
        Ok(session)
    }

    async fn create_session(&self, endpoint_key: &str) -> anyhow::Result<ClientSession> {
        let user = self.acting_user()?;
        let baseline = ClientOptions::new(user, self.config.addresses());
        let mut options = if conf_dir_present(&self.config.conf_dir).await {
            tracing::info!(
                "found {:?}, logging in with kerberos",
                self.config.conf_dir
            );
            retry(
                &self.config.retry,
                self.sleeper.as_ref(),
                "kerberos login",
                |attempt| self.delegated_options(&baseline, attempt),
            )
            .await?
        } else {
            baseline
        };
        if !endpoint_key.is_empty() {
            options.addresses = hadoop_conf::endpoint_addresses(
                endpoint_key,
                &options.addresses,
                options.use_https,
            );
        }
        tracing::info!(
            "connecting to {:?} as {}",
            options.addresses,
            options.user
        );
        self.connector
            .connect(&options)
            .await
            .context("couldn't connect to namenode")
    }

    // one login attempt, everything is re-read from disk each time
    async fn delegated_options(
        &self,
        baseline: &ClientOptions,
        attempt: u32,
    ) -> anyhow::Result<ClientOptions> {
        tracing::debug!("kerberos login attempt {attempt}");
        let conf_dir = &self.config.conf_dir;
        let cluster = ClusterConfig::load(conf_dir).await?;
        let credential = KerberosCredential::load(conf_dir, &baseline.user).await?;
        self.authenticator
            .login(&credential)
            .await
            .with_context(|| format!("failed to log in as {}", credential.principal))?;
        let mut options = baseline.clone();
        let addresses = cluster.webhdfs_addresses();
        if !addresses.is_empty() {
            options.addresses = addresses;
        }
        options.use_https = cluster.use_https();
        options.kerberos = Some(credential);
        Ok(options)
    }
}
