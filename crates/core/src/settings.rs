//! Environment settings for a suite run
//!
//! Settings are resolved once, from environment variables with fallback
//! defaults, and are read-only afterwards. Components take them by reference
//! (usually through an `Arc`) rather than reaching for global state;
//! [`EnvironmentSettings::global`] exists for entry points that need the
//! process-wide instance.
//!
//! Resolution never fails. A required value that resolves empty is reported
//! by the component that needs it.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default IDE version used when `CODE_VERSION` is unset
pub const DEFAULT_VSCODE_VERSION: &str = "latest";
/// Default dev hub alias used when `DEV_HUB_ALIAS_NAME` is unset
pub const DEFAULT_DEV_HUB_ALIAS: &str = "vscodeOrg";
/// Default dev hub username used when `DEV_HUB_USER_NAME` is unset
pub const DEFAULT_DEV_HUB_USER: &str = "svcideebot@salesforce.com";
/// Spec-file glob used when `SPEC_FILES` is unset
pub const DEFAULT_SPEC_FILES: &str = "./lib/specs/**/*.e2e.js";

/// Process-wide settings resolved from the environment
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentSettings {
    /// IDE version to download and drive (`CODE_VERSION`)
    pub vscode_version: String,
    /// Spec files to run (`SPEC_FILES`, relative to `./lib/specs/`)
    pub spec_files: Vec<String>,
    /// Dev hub alias (`DEV_HUB_ALIAS_NAME`)
    pub dev_hub_alias_name: String,
    /// Dev hub username (`DEV_HUB_USER_NAME`)
    pub dev_hub_user_name: String,
    /// Folder holding extension VSIX files
    /// (`EXTENSION_PATH`, overridden by `SALESFORCEDX_VSCODE_EXTENSIONS_PATH`)
    pub extension_path: PathBuf,
    /// Integer multiplier applied to every throttled pause (`THROTTLE_FACTOR`)
    pub throttle_factor: u32,
    /// Auth URL for a pre-authorized org (`SFDX_AUTH_URL`)
    pub sfdx_auth_url: Option<String>,
    /// Org id of a pre-authorized org (`ORG_ID`)
    pub org_id: Option<String>,
    /// Java home for the Apex language server (`JAVA_HOME`)
    pub java_home: Option<String>,
    /// Existing project to use instead of provisioning one (`USE_EXISTING_PROJECT_PATH`)
    pub use_existing_project: Option<PathBuf>,
    /// Verbose diagnostics (`E2E_DEBUG`)
    pub debug: bool,
    /// Scratch directory for generated and cloned projects
    pub temp_folder: PathBuf,
    /// When these settings were resolved
    #[serde(skip)]
    pub start_time: DateTime<Local>,
}

/// Whether an `E2E_DEBUG` value turns debugging on (`1`, `true`, `yes`)
pub fn is_debug_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vscode_version: DEFAULT_VSCODE_VERSION.to_string(),
            spec_files: vec![DEFAULT_SPEC_FILES.to_string()],
            dev_hub_alias_name: DEFAULT_DEV_HUB_ALIAS.to_string(),
            dev_hub_user_name: DEFAULT_DEV_HUB_USER.to_string(),
            extension_path: cwd.join("extensions"),
            throttle_factor: 1,
            sfdx_auth_url: None,
            org_id: None,
            java_home: None,
            use_existing_project: None,
            debug: false,
            temp_folder: cwd.join("e2e-temp"),
            start_time: Local::now(),
        }
    }
}

static GLOBAL_SETTINGS: once_cell::sync::Lazy<EnvironmentSettings> =
    once_cell::sync::Lazy::new(EnvironmentSettings::from_env);

impl EnvironmentSettings {
    /// Process-wide settings, resolved from the environment on first access
    pub fn global() -> &'static EnvironmentSettings {
        &GLOBAL_SETTINGS
    }

    /// Resolve settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings from an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(version) = var("CODE_VERSION") {
            settings.vscode_version = version;
        }
        if let Some(spec_files) = var("SPEC_FILES") {
            settings.spec_files = vec![format!("./lib/specs/{}", spec_files)];
        }
        if let Some(alias) = var("DEV_HUB_ALIAS_NAME") {
            settings.dev_hub_alias_name = alias;
        }
        if let Some(user) = var("DEV_HUB_USER_NAME") {
            settings.dev_hub_user_name = user;
        }
        if let Some(path) = var("EXTENSION_PATH") {
            settings.extension_path = PathBuf::from(path);
        }
        if let Some(path) = var("SALESFORCEDX_VSCODE_EXTENSIONS_PATH") {
            settings.extension_path = PathBuf::from(path);
        }
        if let Some(factor) = var("THROTTLE_FACTOR") {
            match factor.trim().parse::<u32>() {
                Ok(value) if value > 0 => settings.throttle_factor = value,
                _ => tracing::warn!(
                    "Ignoring invalid THROTTLE_FACTOR '{}', using {}",
                    factor,
                    settings.throttle_factor
                ),
            }
        }
        settings.sfdx_auth_url = var("SFDX_AUTH_URL");
        settings.org_id = var("ORG_ID");
        settings.java_home = var("JAVA_HOME");
        settings.use_existing_project = var("USE_EXISTING_PROJECT_PATH").map(PathBuf::from);
        settings.debug = var("E2E_DEBUG").is_some_and(|v| is_debug_flag(&v));

        if let Some(url) = &settings.sfdx_auth_url {
            crate::redaction::add_global_secret(url);
        }

        settings
    }

    /// Scale a pause by the throttle factor
    pub fn throttled(&self, duration: Duration) -> Duration {
        duration.saturating_mul(self.throttle_factor)
    }

    /// Sleep for `duration` scaled by the throttle factor
    pub async fn pause(&self, duration: Duration) {
        let throttled = self.throttled(duration);
        tracing::trace!("Pausing for {:?}", throttled);
        tokio::time::sleep(throttled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_debug_flag_values() {
        assert!(is_debug_flag("1"));
        assert!(is_debug_flag(" TRUE "));
        assert!(is_debug_flag("yes"));
        assert!(!is_debug_flag("0"));
        assert!(!is_debug_flag("off"));
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let settings = EnvironmentSettings::from_lookup(|_| None);
        assert_eq!(settings.vscode_version, "latest");
        assert_eq!(settings.dev_hub_alias_name, "vscodeOrg");
        assert_eq!(settings.dev_hub_user_name, "svcideebot@salesforce.com");
        assert_eq!(settings.throttle_factor, 1);
        assert_eq!(settings.spec_files, vec![DEFAULT_SPEC_FILES.to_string()]);
        assert!(settings.extension_path.ends_with("extensions"));
        assert!(settings.temp_folder.ends_with("e2e-temp"));
        assert!(settings.sfdx_auth_url.is_none());
        assert!(!settings.debug);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = EnvironmentSettings::from_lookup(lookup_from(&[
            ("CODE_VERSION", "1.90.0"),
            ("SPEC_FILES", "apexLsp.e2e.js"),
            ("DEV_HUB_ALIAS_NAME", "hub"),
            ("DEV_HUB_USER_NAME", "hub@example.com"),
            ("THROTTLE_FACTOR", "3"),
            ("JAVA_HOME", "/opt/jdk"),
            ("USE_EXISTING_PROJECT_PATH", "/work/project"),
            ("E2E_DEBUG", "true"),
        ]));
        assert_eq!(settings.vscode_version, "1.90.0");
        assert_eq!(settings.spec_files, vec!["./lib/specs/apexLsp.e2e.js"]);
        assert_eq!(settings.dev_hub_alias_name, "hub");
        assert_eq!(settings.dev_hub_user_name, "hub@example.com");
        assert_eq!(settings.throttle_factor, 3);
        assert_eq!(settings.java_home.as_deref(), Some("/opt/jdk"));
        assert_eq!(
            settings.use_existing_project,
            Some(PathBuf::from("/work/project"))
        );
        assert!(settings.debug);
    }

    #[test]
    fn test_second_extension_variable_wins() {
        let settings = EnvironmentSettings::from_lookup(lookup_from(&[
            ("EXTENSION_PATH", "/a"),
            ("SALESFORCEDX_VSCODE_EXTENSIONS_PATH", "/b"),
        ]));
        assert_eq!(settings.extension_path, PathBuf::from("/b"));

        let settings = EnvironmentSettings::from_lookup(lookup_from(&[("EXTENSION_PATH", "/a")]));
        assert_eq!(settings.extension_path, PathBuf::from("/a"));
    }

    #[test]
    fn test_invalid_throttle_factor_keeps_default() {
        for raw in ["zero", "0", "-2", ""] {
            let settings =
                EnvironmentSettings::from_lookup(lookup_from(&[("THROTTLE_FACTOR", raw)]));
            assert_eq!(settings.throttle_factor, 1, "input {:?}", raw);
        }
    }

    #[test]
    fn test_throttled_scales_duration() {
        let settings = EnvironmentSettings {
            throttle_factor: 4,
            ..EnvironmentSettings::default()
        };
        assert_eq!(
            settings.throttled(Duration::from_secs(2)),
            Duration::from_secs(8)
        );
    }

    #[test]
    fn test_global_is_resolved_once() {
        let first = EnvironmentSettings::global() as *const EnvironmentSettings;
        let second = EnvironmentSettings::global() as *const EnvironmentSettings;
        assert_eq!(first, second);
    }
}
