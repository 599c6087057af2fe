//! Dev hub authorization
//!
//! The configured alias/username pair must already be registered with the
//! cloud CLI as a non-scratch org. That check runs once per process: the
//! result lives in a [`VerificationCache`] shared by every suite.

use crate::errors::{CliError, ConfigError, OrgError, Result, WorkspaceError};
use crate::process::CommandRunner;
use crate::settings::EnvironmentSettings;
use crate::sf::SfCli;
use once_cell::sync::{Lazy, OnceCell};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Auth descriptor written into the workspace for `org:login:sfdx-url`
pub const AUTH_FILE_NAME: &str = "authFile.json";

/// Memo of a successful dev hub verification
#[derive(Debug, Clone, Default)]
pub struct VerificationCache {
    verified: Arc<OnceCell<(String, String)>>,
}

static SHARED_CACHE: Lazy<VerificationCache> = Lazy::new(VerificationCache::default);

impl VerificationCache {
    /// A fresh, unverified cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache
    pub fn shared() -> VerificationCache {
        SHARED_CACHE.clone()
    }

    /// Whether `alias`/`username` has already been verified
    pub fn is_verified(&self, alias: &str, username: &str) -> bool {
        self.verified
            .get()
            .is_some_and(|(a, u)| a == alias && u == username)
    }

    fn mark_verified(&self, alias: &str, username: &str) {
        if self
            .verified
            .set((alias.to_string(), username.to_string()))
            .is_err()
        {
            warn!("Dev hub verification cache already holds a different pair");
        }
    }
}

/// Whether `org:list` output contains a non-scratch org with this alias and username
pub fn org_list_contains(org_list: &Value, alias: &str, username: &str) -> bool {
    org_list
        .get("nonScratchOrgs")
        .and_then(Value::as_array)
        .is_some_and(|orgs| {
            orgs.iter().any(|org| {
                org.get("alias").and_then(Value::as_str) == Some(alias)
                    && org.get("username").and_then(Value::as_str) == Some(username)
            })
        })
}

/// Verify the configured dev hub and log it in from a fresh auth descriptor
#[instrument(skip_all, fields(alias = %settings.dev_hub_alias_name))]
pub async fn authorize_dev_hub<R: CommandRunner>(
    settings: &EnvironmentSettings,
    sf: &SfCli<R>,
    cache: &VerificationCache,
    workspace: &Path,
) -> Result<()> {
    let alias = settings.dev_hub_alias_name.trim();
    let username = settings.dev_hub_user_name.trim();
    if alias.is_empty() {
        error!("DEV_HUB_ALIAS_NAME is empty");
        return Err(ConfigError::MissingSetting {
            variable: "DEV_HUB_ALIAS_NAME",
        }
        .into());
    }
    if username.is_empty() {
        error!("DEV_HUB_USER_NAME is empty");
        return Err(ConfigError::MissingSetting {
            variable: "DEV_HUB_USER_NAME",
        }
        .into());
    }

    if cache.is_verified(alias, username) {
        debug!("Dev hub {} already verified in this process", alias);
    } else {
        let org_list = sf.org_list().await?;
        if !org_list_contains(&org_list, alias, username) {
            let err = OrgError::DevHubNotFound {
                alias: alias.to_string(),
                username: username.to_string(),
            };
            error!("{}", err);
            return Err(err.into());
        }
        cache.mark_verified(alias, username);
        info!("Verified dev hub {} ({})", alias, username);
    }

    let auth_file = write_auth_file(sf, alias, workspace).await?;
    let login = sf.org_login_sfdx_url(&auth_file).await;
    if let Err(e) = std::fs::remove_file(&auth_file) {
        warn!("Failed to remove {}: {}", auth_file.display(), e);
    }
    login?;

    sf.alias_set(alias, username).await?;
    info!("Dev hub {} authorized", alias);
    Ok(())
}

async fn write_auth_file<R: CommandRunner>(sf: &SfCli<R>, alias: &str, workspace: &Path) -> Result<PathBuf> {
    let descriptor = sf.org_display(alias, true).await?;
    if let Some(url) = descriptor.get("sfdxAuthUrl").and_then(Value::as_str) {
        crate::redaction::add_global_secret(url);
    }
    if let Some(token) = descriptor.get("accessToken").and_then(Value::as_str) {
        crate::redaction::add_global_secret(token);
    }

    let path = workspace.join(AUTH_FILE_NAME);
    let io_error = |source| WorkspaceError::Io {
        path: path.clone(),
        source,
    };
    std::fs::create_dir_all(workspace).map_err(io_error)?;
    let content = serde_json::to_string_pretty(&descriptor).map_err(|e| CliError::InvalidJson {
        command: "org:display".to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(&path, content).map_err(io_error)?;
    debug!("Wrote auth descriptor to {}", path.display());
    Ok(path)
}
