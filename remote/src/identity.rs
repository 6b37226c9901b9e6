use anyhow::{Context, anyhow};

pub const USER_ENV: &str = "HADOOP_USER_NAME";

/// Name of the user running the process as reported by the OS
pub fn os_user() -> anyhow::Result<String> {
    let uid = nix::unistd::Uid::current();
    let user = nix::unistd::User::from_uid(uid)
        .with_context(|| format!("failed looking up user with uid {uid}"))?
        .ok_or_else(|| anyhow!("no user with uid {uid}"))?;
    Ok(user.name)
}

/// The identity rhdfs acts as: the explicit override if set, the OS user otherwise
pub fn acting_user(user_override: Option<&str>) -> anyhow::Result<String> {
    match user_override {
        Some(user) if !user.is_empty() => Ok(user.to_string()),
        _ => os_user(),
    }
}
