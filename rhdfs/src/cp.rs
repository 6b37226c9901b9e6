use common::fs::FileSystem;
use common::{Error, Summary, copy, resolve};
use remote::SessionManager;
use tracing::instrument;

use crate::paths::{self, CopyPlan};

/// Copy one source to one destination on the same cluster.
///
/// Directories are only copied with `recursive` set. An existing destination directory receives
/// the source under its own name, like `cp` does.
#[instrument(skip(sessions))]
pub async fn cp(
    sessions: &SessionManager,
    raw_paths: &[String],
    recursive: bool,
) -> Result<Summary, Error> {
    let plan = paths::normalize(raw_paths, || sessions.acting_user())?;
    let fs = sessions.get_session(&plan.endpoint).await?;
    execute(fs.as_ref(), &plan, recursive).await
}

/// Carry out `plan` against `fs`, nothing is modified until the source checks out
#[instrument(skip(fs))]
pub async fn execute(
    fs: &dyn FileSystem,
    plan: &CopyPlan,
    recursive: bool,
) -> Result<Summary, Error> {
    let source = resolve::stat(fs, &plan.source).await?;
    if !source.exists {
        return Err(Error::NotFound(format!(
            "Source {:?} does not exist.",
            plan.source
        )));
    }
    if source.is_dir && !recursive {
        return Err(Error::Usage(format!(
            "{:?} is a directory, use -r to copy it.",
            plan.source
        )));
    }
    let target = resolve::effective_target(fs, &plan.source, &plan.destination).await?;
    if !source.is_dir {
        tracing::info!("copying file {:?} to {target:?}", plan.source);
        return copy::copy_file(fs, &plan.source, &target).await;
    }
    if target.starts_with(&plan.source) {
        return Err(Error::Usage(format!(
            "Cannot copy {:?} into itself ({target:?}).",
            plan.source
        )));
    }
    tracing::info!("copying directory {:?} to {target:?}", plan.source);
    copy::copy_tree(fs, &plan.source, &target).await
}
