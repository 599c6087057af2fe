//! Dev hub and scratch org commands

use crate::cli::CliContext;
use anyhow::Result;
use provost_core::lifecycle::scratch_org_record_key;
use provost_core::org_auth::{authorize_dev_hub, VerificationCache};
use provost_core::process::SystemRunner;
use provost_core::scratch_org::create_default_scratch_org;
use provost_core::settings::EnvironmentSettings;
use provost_core::sf::SfCli;
use provost_core::workspace::OrgEdition;
use std::path::Path;
use tracing::{error, info};

fn sf_client(context: &CliContext) -> SfCli<SystemRunner> {
    SfCli::with_program(SystemRunner::new(), context.sf_path.clone())
}

pub async fn authorize(
    context: &CliContext,
    settings: &EnvironmentSettings,
    workspace: &Path,
) -> Result<()> {
    authorize_dev_hub(
        settings,
        &sf_client(context),
        &VerificationCache::shared(),
        workspace,
    )
    .await?;
    println!("{}", settings.dev_hub_alias_name);
    Ok(())
}

/// Prints the new org's identity as JSON so scripts can delete it later
pub async fn create(
    context: &CliContext,
    workspace: &Path,
    edition: OrgEdition,
    suffix: &str,
) -> Result<()> {
    let identity = create_default_scratch_org(&sf_client(context), edition, workspace, suffix).await?;
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

/// Both deletions are attempted; the command fails if either did
pub async fn delete(
    context: &CliContext,
    settings: &EnvironmentSettings,
    alias: &str,
    org_id: Option<&str>,
) -> Result<()> {
    let sf = sf_client(context);
    let mut failures = 0;

    match sf.org_delete_scratch(alias).await {
        Ok(_) => info!("Deleted scratch org {}", alias),
        Err(e) => {
            error!("Failed to delete scratch org {}: {}", alias, e);
            failures += 1;
        }
    }

    if let Some(org_id) = org_id {
        let record_key = scratch_org_record_key(org_id);
        match sf
            .delete_scratch_org_info(&settings.dev_hub_alias_name, &record_key)
            .await
        {
            Ok(_) => info!("Deleted ScratchOrgInfo record for {}", record_key),
            Err(e) => {
                error!("Failed to delete ScratchOrgInfo record for {}: {}", record_key, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} cleanup step(s) failed for scratch org {}", failures, alias);
    }
    Ok(())
}
