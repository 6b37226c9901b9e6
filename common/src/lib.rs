//! Common building blocks for copying data within an HDFS cluster
//!
//! This crate holds everything that doesn't depend on a particular wire protocol:
//!
//! - [`fs::FileSystem`]: the narrow capability rhdfs needs from a cluster
//! - [`resolve`]: path classification and destination resolution
//! - [`walk`]: lazy pre-order traversal of a remote tree
//! - [`copy`]: single file and recursive tree copy
//! - [`memfs::MemFs`]: in-memory filesystem used for testing
//!
//! # Error Handling
//!
//! Operations return [`Error`]. A failed tree copy keeps the [`copy::Summary`] of the work done
//! before the failure so that the caller can still report it.
//!
//! # Logging
//!
//! All logging goes through `tracing`. [`run`] installs a `tracing-subscriber` formatter writing to
//! stderr, with the level picked from [`OutputConfig`] unless `RUST_LOG` is set.

pub mod config;
pub mod copy;
pub mod error;
pub mod fs;
pub mod memfs;
pub mod resolve;
pub mod walk;

pub use config::OutputConfig;
pub use copy::{Summary, copy_file, copy_tree};
pub use error::Error;

fn init_tracing(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(output.log_level()));
    // ignore failure, a subscriber may already be installed (e.g. in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run `func` to completion on a fresh runtime and report its outcome.
///
/// Errors are printed to stderr unless running in quiet mode, the summary is printed to stdout
/// when requested (or when verbose). Returns `None` on failure.
pub fn run<F, Fut>(output: OutputConfig, func: F) -> Option<Summary>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Summary, anyhow::Error>>,
{
    init_tracing(&output);
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            if !output.quiet {
                eprintln!("failed to start the async runtime: {error:#}");
            }
            return None;
        }
    };
    let res = runtime.block_on(func());
    match res {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                eprintln!("{error:#}");
                if (output.print_summary || output.verbose > 0)
                    && let Some(error) = error.downcast_ref::<Error>()
                {
                    eprintln!("\n{}", error.summary());
                }
            }
            None
        }
    }
}
