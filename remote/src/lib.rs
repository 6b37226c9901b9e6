//! Cluster sessions for rhdfs
//!
//! - [`session::SessionManager`]: one cached, authenticated [`client::ClientSession`] per endpoint
//! - [`kerberos`]: keytab and `krb5.conf` loading, ticket acquisition via `kinit`
//! - [`hadoop_conf`]: namenode addresses from `core-site.xml` and `hdfs-site.xml`
//! - [`retry`]: linear backoff with injectable delays
//! - [`webhdfs`]: the production [`common::fs::FileSystem`] speaking WebHDFS
//!
//! # Authentication
//!
//! Identity is ambient (`HADOOP_USER_NAME` or the OS user) unless the configuration directory
//! exists. In that case every session is preceded by a Kerberos login, retried up to 1000 times
//! with a delay growing by one second per attempt.

pub mod client;
pub mod hadoop_conf;
pub mod identity;
pub mod kerberos;
pub mod retry;
pub mod session;
pub mod webhdfs;

pub use client::{ClientOptions, ClientSession, Connector};
pub use session::{SessionConfig, SessionManager};
pub use webhdfs::WebHdfsConnector;
