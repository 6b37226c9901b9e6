use anyhow::anyhow;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rhdfs",
    version,
    about = "Command line client for HDFS clusters",
    long_about = "`rhdfs` exposes POSIX-like file operations against an HDFS cluster.

EXAMPLE:
    # Copy a directory tree into an existing directory
    rhdfs cp -r /data /backup --summary

Note: namenodes are read from HADOOP_NAMENODE (separated by `_`) unless the configuration
directory holds the cluster configuration. The acting user is HADOOP_USER_NAME or the OS user."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    // Authentication
    /// Directory with `user.keytab`, `krb5.conf` and the cluster configuration
    ///
    /// If the directory exists rhdfs logs in with Kerberos, otherwise the acting user's name is
    /// used as is.
    #[arg(long, value_name = "DIR", global = true, help_heading = "Authentication")]
    conf_dir: Option<std::path::PathBuf>,

    // Progress & output
    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: WARN)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, global = true, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", global = true, help_heading = "Progress & output")]
    quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Copy SOURCE to DEST within a cluster
    ///
    /// If DEST is an existing directory, SOURCE is copied into it under its own name. Existing
    /// files are never overwritten.
    Cp {
        /// Copy directories recursively
        #[arg(short = 'r', short_alias = 'R', long)]
        recursive: bool,

        /// Source and destination: absolute paths, paths relative to the user's home directory or
        /// hdfs://host:port/path URLs
        #[arg(value_name = "PATH")]
        paths: Vec<String>,
    },
}

// usage of the subcommand that failed, with the full "rhdfs <subcommand>" invocation
fn subcommand_usage(name: &str) -> clap::builder::StyledStr {
    let mut command = Args::command();
    command.build();
    match command.find_subcommand_mut(name) {
        Some(subcommand) => subcommand.render_usage(),
        None => command.render_usage(),
    }
}

async fn async_main(args: Args) -> anyhow::Result<common::Summary> {
    let config = remote::SessionConfig::from_env(args.conf_dir.clone());
    let sessions = remote::SessionManager::new(config, Box::new(remote::WebHdfsConnector));
    let (name, result) = match &args.command {
        Command::Cp { recursive, paths } => {
            ("cp", rhdfs::cp::cp(&sessions, paths, *recursive).await)
        }
    };
    result.map_err(|error| {
        if error.is_usage() {
            anyhow!("{error}\n\n{}", subcommand_usage(name))
        } else {
            anyhow::Error::from(error)
        }
    })
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let res = common::run(output, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
