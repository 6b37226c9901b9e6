//! `rhdfs` - command line client for HDFS clusters
//!
//! Exposes POSIX-like file operations against a remote cluster. Currently the only subcommand is
//! `cp`:
//!
//! ```bash
//! # copy a file, the destination is used as is when it doesn't exist
//! rhdfs cp /data/b.txt /backup/b.txt
//!
//! # copy a directory tree into an existing directory, creating /backup/data
//! rhdfs cp -r /data /backup
//!
//! # name the cluster explicitly, relative paths live under /user/<name>
//! rhdfs cp -r hdfs://namenode:9870/data hdfs://namenode:9870/backup
//! ```
//!
//! # Authentication
//!
//! The acting user is `HADOOP_USER_NAME` or the OS user. When the configuration directory
//! (`hdfs_conf`, see `--conf-dir`) exists, rhdfs logs in with Kerberos using the `user.keytab` and
//! `krb5.conf` it contains, and reads namenode addresses from its `core-site.xml` and
//! `hdfs-site.xml`. Otherwise namenodes are taken from `HADOOP_NAMENODE` (separated by `_`).
//!
//! # Behavior
//!
//! - existing files are never overwritten
//! - directories are created with mode 0755, existing directories are reused
//! - the first error stops the copy, whatever was copied until then stays in place
//! - glob patterns are not supported

pub mod cp;
pub mod paths;
