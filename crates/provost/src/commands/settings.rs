//! `provost settings`: show what the environment resolves to

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use provost_core::redaction;
use provost_core::settings::EnvironmentSettings;

pub fn execute(settings: &EnvironmentSettings, format: OutputFormat) -> Result<()> {
    let rendered = render(settings, format)?;
    println!("{}", redaction::redact(&rendered));
    Ok(())
}

fn render(settings: &EnvironmentSettings, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(settings).context("Failed to serialize settings as JSON")
        }
        OutputFormat::Toml => {
            toml::to_string_pretty(settings).context("Failed to serialize settings as TOML")
        }
        OutputFormat::Text => {
            let optional = |value: Option<&str>| value.unwrap_or("<unset>").to_string();
            let lines = [
                ("CODE_VERSION", settings.vscode_version.clone()),
                ("SPEC_FILES", settings.spec_files.join(", ")),
                ("DEV_HUB_ALIAS_NAME", settings.dev_hub_alias_name.clone()),
                ("DEV_HUB_USER_NAME", settings.dev_hub_user_name.clone()),
                ("EXTENSION_PATH", settings.extension_path.display().to_string()),
                ("THROTTLE_FACTOR", settings.throttle_factor.to_string()),
                ("SFDX_AUTH_URL", optional(settings.sfdx_auth_url.as_deref())),
                ("ORG_ID", optional(settings.org_id.as_deref())),
                ("JAVA_HOME", optional(settings.java_home.as_deref())),
                (
                    "USE_EXISTING_PROJECT_PATH",
                    settings
                        .use_existing_project
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "<unset>".to_string()),
                ),
                ("E2E_DEBUG", settings.debug.to_string()),
                ("temp folder", settings.temp_folder.display().to_string()),
            ];
            Ok(lines
                .iter()
                .map(|(name, value)| format!("{:<26} {}", name, value))
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}
