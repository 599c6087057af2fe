//! `provost prepare-workspace`: resolve the workspace a suite would use

use crate::cli::CliContext;
use anyhow::{Context, Result};
use provost_core::process::SystemRunner;
use provost_core::settings::EnvironmentSettings;
use provost_core::sf::SfCli;
use provost_core::workspace::{set_up_testing_workspace, TestRequirementConfig};
use std::path::Path;
use tracing::info;

pub async fn execute(
    context: &CliContext,
    settings: &EnvironmentSettings,
    requirements: &Path,
) -> Result<()> {
    let config = TestRequirementConfig::load_from_path(requirements)
        .with_context(|| format!("Failed to load {}", requirements.display()))?;
    info!(
        "Preparing {} workspace for suite {}",
        config.project_config.shape(),
        config.test_suite_suffix_name
    );

    let sf = SfCli::with_program(SystemRunner::new(), context.sf_path.clone());
    let outcome = set_up_testing_workspace(
        settings,
        &sf,
        &config.project_config,
        &config.test_suite_suffix_name,
    )
    .await?;

    println!("{}", outcome.path.display());
    Ok(())
}
