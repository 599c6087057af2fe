//! IDE extensions under test: installation, activation checks, regression guard

use crate::errors::{Result, WorkspaceError};
use crate::ide::{IdeDriver, RunningExtension};
use crate::polling::{poll_until, PollOutcome, DEFAULT_POLL_INTERVAL};
use crate::settings::EnvironmentSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// An extension the suite cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionConfig {
    /// Publisher-qualified id as reported by the extension host
    pub extension_id: String,
    /// Package name, which prefixes the VSIX file name
    pub name: String,
    /// Install from a VSIX in the extension folder during setup
    #[serde(default = "default_true")]
    pub should_install: bool,
    /// Require the extension to be activated before tests start
    #[serde(default)]
    pub should_verify_activation: bool,
}

fn default_true() -> bool {
    true
}

impl ExtensionConfig {
    fn new(name: &str, verify: bool) -> Self {
        Self {
            extension_id: format!("salesforce.{}", name),
            name: name.to_string(),
            should_install: true,
            should_verify_activation: verify,
        }
    }
}

/// The platform extension pack
pub fn default_extensions() -> Vec<ExtensionConfig> {
    vec![
        ExtensionConfig::new("salesforcedx-vscode", false),
        ExtensionConfig::new("salesforcedx-vscode-core", true),
        ExtensionConfig::new("salesforcedx-vscode-apex", true),
        ExtensionConfig::new("salesforcedx-vscode-apex-debugger", false),
        ExtensionConfig::new("salesforcedx-vscode-apex-replay-debugger", false),
        ExtensionConfig::new("salesforcedx-vscode-lightning", false),
        ExtensionConfig::new("salesforcedx-vscode-lwc", false),
        ExtensionConfig::new("salesforcedx-vscode-soql", false),
        ExtensionConfig::new("salesforcedx-vscode-visualforce", false),
        ExtensionConfig::new("salesforcedx-vscode-expanded", false),
        ExtensionConfig::new("salesforcedx-vscode-services", false),
    ]
}

/// Find `<name>-<version>.vsix` in `folder`
///
/// The character after the name must start a version number, so
/// `salesforcedx-vscode` does not match `salesforcedx-vscode-core-1.0.vsix`.
/// When several versions are present the lexically greatest wins.
pub fn find_vsix(folder: &Path, name: &str) -> Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(WorkspaceError::Io {
                path: folder.to_path_buf(),
                source,
            }
            .into())
        }
    };

    let prefix = format!("{}-", name);
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            file_name.ends_with(".vsix")
                && file_name
                    .strip_prefix(&prefix)
                    .and_then(|rest| rest.chars().next())
                    .is_some_and(|c| c.is_ascii_digit())
        })
        .collect();
    candidates.sort();
    Ok(candidates.pop())
}

/// Install every extension marked `should_install` whose VSIX is available
///
/// A missing VSIX is logged and skipped: the IDE may already have the
/// extension from a previous run.
#[instrument(skip_all)]
pub async fn install_extensions<I: IdeDriver>(
    ide: &I,
    settings: &EnvironmentSettings,
    extensions: &[ExtensionConfig],
) -> Result<Vec<PathBuf>> {
    let mut installed = Vec::new();
    for extension in extensions.iter().filter(|e| e.should_install) {
        match find_vsix(&settings.extension_path, &extension.name)? {
            Some(vsix) => {
                debug!("Installing {} from {}", extension.extension_id, vsix.display());
                ide.install_extension(&vsix).await?;
                installed.push(vsix);
            }
            None => warn!(
                "No VSIX for {} in {}",
                extension.name,
                settings.extension_path.display()
            ),
        }
    }
    info!("Installed {} extension(s)", installed.len());
    Ok(installed)
}

/// Wait until every extension marked `should_verify_activation` is activated
///
/// Returns false if some were still inactive (or absent) when `timeout` elapsed.
#[instrument(skip_all)]
pub async fn verify_extensions_are_running<I: IdeDriver>(
    ide: &I,
    extensions: &[ExtensionConfig],
    timeout: Duration,
) -> Result<bool> {
    let required: Vec<&str> = extensions
        .iter()
        .filter(|e| e.should_verify_activation)
        .map(|e| e.extension_id.as_str())
        .collect();
    if required.is_empty() {
        return Ok(true);
    }

    let outcome = poll_until(DEFAULT_POLL_INTERVAL, timeout, || async {
        let running = ide.running_extensions().await?;
        let all_active = required.iter().all(|id| {
            running
                .iter()
                .any(|r| r.extension_id == *id && r.activated)
        });
        Ok(all_active.then_some(()))
    })
    .await?;

    match outcome {
        PollOutcome::Found(()) => {
            debug!("All {} required extensions are active", required.len());
            Ok(true)
        }
        PollOutcome::TimedOut { elapsed, .. } => {
            warn!("Extensions not all active after {:?}: {:?}", elapsed, required);
            Ok(false)
        }
    }
}

/// Extensions the extension host currently flags as buggy
pub async fn find_buggy_extensions<I: IdeDriver>(ide: &I) -> Result<Vec<RunningExtension>> {
    Ok(ide
        .running_extensions()
        .await?
        .into_iter()
        .filter(|e| e.is_buggy)
        .collect())
}
