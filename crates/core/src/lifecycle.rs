//! Suite lifecycle: set up the workspace and org, guarantee their teardown
//!
//! A [`TestSetup`] is owned by one suite. `set_up` walks the states in order
//! and stops at the first failure without rolling anything back; `tear_down`
//! releases whatever was acquired and must be called regardless of how
//! `set_up` ended. [`TestSetup::run`] pairs the two around a suite body.

use crate::errors::{PollError, ProvostError, Result};
use crate::extensions::{
    default_extensions, find_buggy_extensions, install_extensions, verify_extensions_are_running,
    ExtensionConfig,
};
use crate::ide::IdeDriver;
use crate::org_auth::{authorize_dev_hub, VerificationCache};
use crate::process::CommandRunner;
use crate::project_files::{set_java_home, set_scratch_org_edition};
use crate::scratch_org::{
    confirm_default_org_in_ide, create_default_scratch_org, ScratchOrgIdentity,
    DEFAULT_ORG_CONFIRM_TIMEOUT,
};
use crate::settings::EnvironmentSettings;
use crate::sf::SfCli;
use crate::workspace::{
    open_in_ide, set_up_testing_workspace, ProjectShapeOption, TestRequirementConfig,
    WORKSPACE_OPEN_TIMEOUT,
};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Budget for required extensions to finish activating
pub const EXTENSION_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Where a suite's environment stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupState {
    #[default]
    Uninitialized,
    WorkspaceReady,
    DevHubAuthorized,
    ScratchOrgReady,
    TornDown,
}

impl fmt::Display for SetupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::WorkspaceReady => "workspace-ready",
            Self::DevHubAuthorized => "dev-hub-authorized",
            Self::ScratchOrgReady => "scratch-org-ready",
            Self::TornDown => "torn-down",
        };
        f.write_str(name)
    }
}

/// Dev hub `ScratchOrgInfo` key for a scratch org: its id without the last three characters
pub fn scratch_org_record_key(org_id: &str) -> String {
    let keep = org_id.chars().count().saturating_sub(3);
    org_id.chars().take(keep).collect()
}

/// Environment manager for one suite
pub struct TestSetup<R, I> {
    settings: Arc<EnvironmentSettings>,
    sf: SfCli<R>,
    ide: I,
    verification: VerificationCache,
    extensions: Vec<ExtensionConfig>,
    state: SetupState,
    project_folder_path: Option<PathBuf>,
    scratch_org: Option<ScratchOrgIdentity>,
}

impl<R, I> fmt::Debug for TestSetup<R, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSetup")
            .field("state", &self.state)
            .field("project_folder_path", &self.project_folder_path)
            .field("scratch_org", &self.scratch_org)
            .finish_non_exhaustive()
    }
}

impl<R: CommandRunner, I: IdeDriver> TestSetup<R, I> {
    /// Create a manager using the process-wide dev hub verification cache
    pub fn new(settings: Arc<EnvironmentSettings>, runner: R, ide: I) -> Self {
        Self {
            settings,
            sf: SfCli::new(runner),
            ide,
            verification: VerificationCache::shared(),
            extensions: default_extensions(),
            state: SetupState::Uninitialized,
            project_folder_path: None,
            scratch_org: None,
        }
    }

    /// Use a specific verification cache
    pub fn with_verification_cache(mut self, cache: VerificationCache) -> Self {
        self.verification = cache;
        self
    }

    /// Replace the extension list installed and verified during setup
    pub fn with_extensions(mut self, extensions: Vec<ExtensionConfig>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn state(&self) -> SetupState {
        self.state
    }

    pub fn settings(&self) -> &EnvironmentSettings {
        &self.settings
    }

    pub fn sf(&self) -> &SfCli<R> {
        &self.sf
    }

    pub fn ide(&self) -> &I {
        &self.ide
    }

    /// Workspace folder resolved by `set_up`
    pub fn project_folder_path(&self) -> Option<&Path> {
        self.project_folder_path.as_deref()
    }

    pub fn scratch_org(&self) -> Option<&ScratchOrgIdentity> {
        self.scratch_org.as_ref()
    }

    pub fn scratch_org_alias_name(&self) -> Option<&str> {
        self.scratch_org.as_ref().map(|org| org.alias_name.as_str())
    }

    pub fn scratch_org_id(&self) -> Option<&str> {
        self.scratch_org.as_ref().map(|org| org.org_id.as_str())
    }

    /// Prepare the environment described by `config`
    #[instrument(skip_all, fields(suite = %config.test_suite_suffix_name))]
    pub async fn set_up(&mut self, config: &TestRequirementConfig) -> Result<()> {
        info!("Setting up test environment");
        let suffix = config.test_suite_suffix_name.as_str();

        install_extensions(&self.ide, &self.settings, &self.extensions).await?;

        let workspace = set_up_testing_workspace(&self.settings, &self.sf, &config.project_config, suffix).await?;
        self.project_folder_path = Some(workspace.path.clone());
        if workspace.needs_open {
            open_in_ide(
                &self.ide,
                &workspace.path,
                self.settings.throttled(WORKSPACE_OPEN_TIMEOUT),
            )
            .await?;
        }
        self.state = SetupState::WorkspaceReady;
        debug!("Workspace ready at {}", workspace.path.display());

        if workspace.shape == ProjectShapeOption::None {
            if config.is_org_required {
                warn!("Org requested for a suite without a project; skipping org setup");
            }
            info!("Test environment ready (no project)");
            return Ok(());
        }

        let activation_timeout = self.settings.throttled(EXTENSION_ACTIVATION_TIMEOUT);
        if !verify_extensions_are_running(&self.ide, &self.extensions, activation_timeout).await? {
            let err = PollError::TimedOut {
                what: "required extensions to activate".to_string(),
                elapsed: activation_timeout,
            };
            error!("{}", err);
            return Err(err.into());
        }

        if let Some(edition) = config.scratch_org_edition {
            set_scratch_org_edition(&workspace.path, edition)?;
        }
        if cfg!(target_os = "macos") {
            if let Some(java_home) = &self.settings.java_home {
                set_java_home(&workspace.path, java_home)?;
            }
        }

        if config.is_org_required {
            authorize_dev_hub(&self.settings, &self.sf, &self.verification, &workspace.path).await?;
            self.state = SetupState::DevHubAuthorized;

            let edition = config.scratch_org_edition.unwrap_or_default();
            let identity = create_default_scratch_org(&self.sf, edition, &workspace.path, suffix).await?;
            let alias = identity.alias_name.clone();
            // Recorded before the IDE check so tear_down deletes the org either way
            self.scratch_org = Some(identity);
            confirm_default_org_in_ide(
                &self.ide,
                &alias,
                self.settings.throttled(DEFAULT_ORG_CONFIRM_TIMEOUT),
            )
            .await?;
            self.state = SetupState::ScratchOrgReady;
        }

        info!("Test environment ready ({})", self.state);
        Ok(())
    }

    /// Release the scratch org and check the extension host for regressions
    ///
    /// Deletion failures are logged, never returned. The scratch org identity
    /// is cleared only once the org is deleted, so a later call retries. Buggy
    /// extensions are reported as [`ProvostError::Regression`] once cleanup
    /// has finished.
    #[instrument(skip_all)]
    pub async fn tear_down(&mut self) -> Result<()> {
        info!("Tearing down test environment");
        let buggy: Vec<String> = match find_buggy_extensions(&self.ide).await {
            Ok(found) => found.into_iter().map(|e| e.extension_id).collect(),
            Err(e) => {
                warn!("Could not inspect running extensions: {}", e);
                Vec::new()
            }
        };

        match self.scratch_org.take() {
            Some(org) => {
                if !self.delete_scratch_org(&org).await {
                    warn!("Keeping scratch org {} for a later teardown", org.alias_name);
                    self.scratch_org = Some(org);
                }
            }
            None => debug!("No scratch org to delete"),
        }

        self.state = SetupState::TornDown;

        if buggy.is_empty() {
            info!("Test environment torn down");
            Ok(())
        } else {
            error!("Buggy extensions detected: {}", buggy.join(", "));
            Err(ProvostError::Regression { extensions: buggy })
        }
    }

    /// Returns whether the org itself was deleted
    async fn delete_scratch_org(&self, org: &ScratchOrgIdentity) -> bool {
        let deleted = match self.sf.org_delete_scratch(&org.alias_name).await {
            Ok(_) => {
                info!("Deleted scratch org {}", org.alias_name);
                true
            }
            Err(e) => {
                error!("Failed to delete scratch org {}: {}", org.alias_name, e);
                false
            }
        };

        let record_key = scratch_org_record_key(&org.org_id);
        if record_key.is_empty() {
            warn!("Org id '{}' too short to derive a ScratchOrgInfo key", org.org_id);
            return deleted;
        }
        match self
            .sf
            .delete_scratch_org_info(&self.settings.dev_hub_alias_name, &record_key)
            .await
        {
            Ok(_) => debug!("Deleted ScratchOrgInfo record for {}", record_key),
            Err(e) => error!("Failed to delete ScratchOrgInfo record for {}: {}", record_key, e),
        }
        deleted
    }

    /// Run `body` between `set_up` and a `tear_down` that always happens
    ///
    /// The first error wins: a body or setup failure is returned even if
    /// teardown then reports a regression. A panic in setup or in the body
    /// (a failed assertion) is resumed once teardown has finished.
    pub async fn run<T, F>(&mut self, config: &TestRequirementConfig, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a TestSetup<R, I>) -> LocalBoxFuture<'a, Result<T>>,
    {
        let set_up = AssertUnwindSafe(self.set_up(config)).catch_unwind().await;
        let outcome = match set_up {
            Ok(Ok(())) => AssertUnwindSafe(body(&*self)).catch_unwind().await,
            Ok(Err(e)) => Ok(Err(e)),
            Err(payload) => Err(payload),
        };
        let teardown = self.tear_down().await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(payload) => {
                if let Err(teardown_error) = teardown {
                    warn!("Teardown also failed: {}", teardown_error);
                }
                error!("Suite panicked; environment torn down");
                panic::resume_unwind(payload);
            }
        };

        match (outcome, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown_error)) => {
                warn!("Teardown also failed: {}", teardown_error);
                Err(e)
            }
        }
    }
}
