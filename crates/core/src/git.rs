//! Git operations used to obtain NAMED workspaces

use crate::errors::Result;
use crate::process::{display_command, CommandRunner, SpawnOptions};
use std::path::Path;
use tracing::{debug, instrument};

/// Whether the remote repository answers `git ls-remote`
#[instrument(skip(runner))]
pub async fn repo_exists<R: CommandRunner>(runner: &R, url: &str) -> Result<bool> {
    let args = vec!["ls-remote".to_string(), url.to_string()];
    let result = runner.run("git", &args, &git_options()).await?;
    debug!(exit_code = result.exit_code, "git ls-remote {}", url);
    Ok(result.success())
}

/// Clone `url` into `destination`
#[instrument(skip(runner))]
pub async fn clone<R: CommandRunner>(runner: &R, url: &str, destination: &Path) -> Result<()> {
    let args = vec![
        "clone".to_string(),
        url.to_string(),
        destination.to_string_lossy().into_owned(),
    ];
    let command = display_command("git", &args);
    runner
        .run("git", &args, &git_options())
        .await?
        .ensure_success(&command)?;
    Ok(())
}

/// Repository name from its URL: last path segment without `.git`
///
/// ```rust
/// use provost_core::git::repo_name_from_url;
///
/// assert_eq!(repo_name_from_url("https://github.com/trailheadapps/dreamhouse-lwc.git"), "dreamhouse-lwc");
/// assert_eq!(repo_name_from_url("git@github.com:org/repo"), "repo");
/// ```
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

fn git_options() -> SpawnOptions {
    let mut options = SpawnOptions::default();
    // Never block on a credential prompt for a private or missing repo
    options
        .env
        .insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());
    options
}
