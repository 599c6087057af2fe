//! Test workspace provisioning
//!
//! A suite declares the project it needs as a [`ProjectConfig`]: a freshly
//! generated project (`New`), a named repository (`Named`), an arbitrary
//! existing folder (`Any`) or no project at all (`None`). Each variant carries
//! exactly the fields it needs, so an invalid combination cannot reach
//! [`set_up_testing_workspace`]; the flat wire form ([`RawProjectConfig`]) is
//! validated on conversion.

use crate::errors::{ConfigError, ProvostError, Result, WorkspaceError};
use crate::git;
use crate::ide::IdeDriver;
use crate::polling::{poll_until, PollOutcome, DEFAULT_POLL_INTERVAL};
use crate::process::CommandRunner;
use crate::settings::EnvironmentSettings;
use crate::sf::SfCli;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// How long the IDE gets to report the opened folder as its workspace
pub const WORKSPACE_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Project shape tags as they appear in suite requirement files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectShapeOption {
    New,
    Named,
    Any,
    None,
}

impl fmt::Display for ProjectShapeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::New => "NEW",
            Self::Named => "NAMED",
            Self::Any => "ANY",
            Self::None => "NONE",
        };
        f.write_str(tag)
    }
}

impl FromStr for ProjectShapeOption {
    type Err = WorkspaceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "NAMED" => Ok(Self::Named),
            "ANY" => Ok(Self::Any),
            "NONE" => Ok(Self::None),
            _ => Err(WorkspaceError::UnsupportedShape {
                shape: s.to_string(),
            }),
        }
    }
}

/// Flat project description as written by suite authors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProjectConfig {
    pub project_shape: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_repo_url: Option<String>,
}

/// The project a suite runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProjectConfig", into = "RawProjectConfig")]
pub enum ProjectConfig {
    /// Generate a fresh project under the temp folder
    New,
    /// Clone a repository, or reuse a local checkout whose folder name matches it
    Named {
        github_repo_url: String,
        folder_path: Option<PathBuf>,
    },
    /// Use an existing folder as-is; the IDE is expected to have it open already
    Any { folder_path: PathBuf },
    /// No project; only the intended path is computed
    None,
}

impl ProjectConfig {
    /// The shape tag of this configuration
    pub fn shape(&self) -> ProjectShapeOption {
        match self {
            Self::New => ProjectShapeOption::New,
            Self::Named { .. } => ProjectShapeOption::Named,
            Self::Any { .. } => ProjectShapeOption::Any,
            Self::None => ProjectShapeOption::None,
        }
    }
}

impl TryFrom<RawProjectConfig> for ProjectConfig {
    type Error = WorkspaceError;

    fn try_from(raw: RawProjectConfig) -> std::result::Result<Self, Self::Error> {
        let shape = raw.project_shape.parse::<ProjectShapeOption>().map_err(log_precondition)?;
        let config = match shape {
            ProjectShapeOption::New => Self::New,
            ProjectShapeOption::None => Self::None,
            ProjectShapeOption::Named => {
                let url = raw
                    .github_repo_url
                    .filter(|url| !url.trim().is_empty())
                    .ok_or_else(|| log_precondition(WorkspaceError::MissingRepoUrl))?;
                Self::Named {
                    github_repo_url: url,
                    folder_path: raw.folder_path,
                }
            }
            ProjectShapeOption::Any => {
                let folder_path = raw
                    .folder_path
                    .filter(|path| !path.as_os_str().is_empty())
                    .ok_or_else(|| log_precondition(WorkspaceError::MissingFolderPath))?;
                Self::Any { folder_path }
            }
        };
        Ok(config)
    }
}

impl From<ProjectConfig> for RawProjectConfig {
    fn from(config: ProjectConfig) -> Self {
        let project_shape = config.shape().to_string();
        match config {
            ProjectConfig::New | ProjectConfig::None => Self {
                project_shape,
                ..Self::default()
            },
            ProjectConfig::Named {
                github_repo_url,
                folder_path,
            } => Self {
                project_shape,
                folder_path,
                github_repo_url: Some(github_repo_url),
            },
            ProjectConfig::Any { folder_path } => Self {
                project_shape,
                folder_path: Some(folder_path),
                github_repo_url: None,
            },
        }
    }
}

/// Scratch org edition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgEdition {
    #[default]
    Developer,
    Enterprise,
}

impl OrgEdition {
    /// Value passed to `--edition` and written to the definition file
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for OrgEdition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrgEdition {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "developer" => Ok(Self::Developer),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(ConfigError::Parsing {
                message: format!(
                    "Invalid org edition: '{}'. Valid values are: developer, enterprise",
                    s
                ),
            }),
        }
    }
}

/// What a suite needs before its first test runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequirementConfig {
    pub project_config: ProjectConfig,
    #[serde(default)]
    pub is_org_required: bool,
    pub test_suite_suffix_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_org_edition: Option<OrgEdition>,
}

impl TestRequirementConfig {
    /// Parse a requirement file in TOML form
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ConfigError::Parsing {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Load a requirement file from disk
    pub fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading test requirements from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }
}

/// Where the workspace ended up and whether the IDE still has to open it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceOutcome {
    pub path: PathBuf,
    pub needs_open: bool,
    /// Shape actually provisioned, after any existing-project override
    pub shape: ProjectShapeOption,
}

/// Name of the generated project for a suite
pub fn temp_project_name(suffix: &str) -> String {
    format!("TempProject-{}", suffix)
}

fn log_precondition(err: WorkspaceError) -> WorkspaceError {
    error!("{}", err);
    err
}

fn precondition(err: WorkspaceError) -> ProvostError {
    log_precondition(err).into()
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ProvostError + '_ {
    move |source| {
        WorkspaceError::Io {
            path: path.to_path_buf(),
            source,
        }
        .into()
    }
}

/// Resolve the workspace for `project_config`
///
/// `USE_EXISTING_PROJECT_PATH` overrides every shape with `Any`.
#[instrument(skip(settings, sf))]
pub async fn set_up_testing_workspace<R: CommandRunner>(
    settings: &EnvironmentSettings,
    sf: &SfCli<R>,
    project_config: &ProjectConfig,
    suffix: &str,
) -> Result<WorkspaceOutcome> {
    let effective = match &settings.use_existing_project {
        Some(existing) => {
            info!("Using existing project {}", existing.display());
            ProjectConfig::Any {
                folder_path: existing.clone(),
            }
        }
        None => project_config.clone(),
    };
    let temp_folder = &settings.temp_folder;

    let shape = effective.shape();
    let outcome = match effective {
        ProjectConfig::New => {
            std::fs::create_dir_all(temp_folder).map_err(io_error(temp_folder))?;
            let name = temp_project_name(suffix);
            sf.generate_project(&name, temp_folder).await?;
            WorkspaceOutcome {
                path: temp_folder.join(name),
                needs_open: true,
                shape,
            }
        }
        ProjectConfig::Named {
            github_repo_url,
            folder_path,
        } => {
            if !git::repo_exists(sf.runner(), &github_repo_url).await? {
                return Err(precondition(WorkspaceError::RepoUnreachable {
                    url: github_repo_url,
                }));
            }
            let repo_name = git::repo_name_from_url(&github_repo_url);
            match folder_path {
                Some(folder) => {
                    let folder_name = folder
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if folder_name != repo_name {
                        return Err(precondition(WorkspaceError::FolderMismatch {
                            folder: folder.display().to_string(),
                            repo_name,
                        }));
                    }
                    debug!("Reusing local checkout {}", folder.display());
                    WorkspaceOutcome {
                        path: folder,
                        needs_open: true,
                        shape,
                    }
                }
                None => {
                    std::fs::create_dir_all(temp_folder).map_err(io_error(temp_folder))?;
                    let destination = temp_folder.join(&repo_name);
                    if destination.exists() {
                        debug!("Removing stale clone {}", destination.display());
                        std::fs::remove_dir_all(&destination).map_err(io_error(&destination))?;
                    }
                    git::clone(sf.runner(), &github_repo_url, &destination).await?;
                    WorkspaceOutcome {
                        path: destination,
                        needs_open: true,
                        shape,
                    }
                }
            }
        }
        ProjectConfig::Any { folder_path } => WorkspaceOutcome {
            path: folder_path,
            needs_open: false,
            shape,
        },
        ProjectConfig::None => WorkspaceOutcome {
            path: temp_folder.join(temp_project_name(suffix)),
            needs_open: false,
            shape,
        },
    };

    info!(
        "Workspace resolved to {} (needs open: {})",
        outcome.path.display(),
        outcome.needs_open
    );
    Ok(outcome)
}

/// Open `path` in the IDE and wait until it reports that folder as its workspace
#[instrument(skip(ide))]
pub async fn open_in_ide<I: IdeDriver>(ide: &I, path: &Path, timeout: Duration) -> Result<()> {
    let expected = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    ide.open_folder(path).await?;

    let last_seen = RefCell::new(None);
    let outcome = poll_until(DEFAULT_POLL_INTERVAL, timeout, || {
        let expected = &expected;
        let last_seen = &last_seen;
        async move {
            let name = ide.workspace_name().await?;
            let matched = name.as_deref() == Some(expected.as_str());
            last_seen.replace(name);
            Ok(matched.then_some(()))
        }
    })
    .await?;

    match outcome {
        PollOutcome::Found(()) => {
            info!("IDE opened project {}", expected);
            Ok(())
        }
        PollOutcome::TimedOut { .. } => Err(precondition(WorkspaceError::NotOpened {
            expected,
            actual: last_seen.into_inner(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ide::mock::MockIde;
    use crate::process::mock::{MockCall, MockRunner};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn settings_in(dir: &Path) -> EnvironmentSettings {
        EnvironmentSettings {
            temp_folder: dir.join("e2e-temp"),
            ..EnvironmentSettings::default()
        }
    }

    fn raw(shape: &str, folder: Option<&str>, url: Option<&str>) -> RawProjectConfig {
        RawProjectConfig {
            project_shape: shape.to_string(),
            folder_path: folder.map(PathBuf::from),
            github_repo_url: url.map(str::to_string),
        }
    }

    #[test]
    fn test_conversion_rejects_invalid_combinations() {
        let err = ProjectConfig::try_from(raw("NAMED", None, None)).unwrap_err();
        assert!(matches!(err, WorkspaceError::MissingRepoUrl));

        let err = ProjectConfig::try_from(raw("NAMED", None, Some("  "))).unwrap_err();
        assert!(matches!(err, WorkspaceError::MissingRepoUrl));

        let err = ProjectConfig::try_from(raw("ANY", None, None)).unwrap_err();
        assert!(matches!(err, WorkspaceError::MissingFolderPath));

        let err = ProjectConfig::try_from(raw("SOME", None, None)).unwrap_err();
        assert!(matches!(err, WorkspaceError::UnsupportedShape { .. }));
    }

    #[test]
    fn test_conversion_keeps_only_relevant_fields() {
        let config = ProjectConfig::try_from(raw("new", Some("/ignored"), None)).unwrap();
        assert_eq!(config, ProjectConfig::New);

        let config =
            ProjectConfig::try_from(raw("NAMED", Some("/src/dreamhouse-lwc"), Some("https://x/dreamhouse-lwc.git")))
                .unwrap();
        assert_eq!(config.shape(), ProjectShapeOption::Named);
    }

    #[test]
    fn test_requirement_file_from_toml() {
        let config = TestRequirementConfig::from_toml_str(
            r#"
            isOrgRequired = true
            testSuiteSuffixName = "ApexLsp"
            scratchOrgEdition = "enterprise"

            [projectConfig]
            projectShape = "NAMED"
            githubRepoUrl = "https://github.com/trailheadapps/dreamhouse-lwc.git"
            "#,
        )
        .unwrap();
        assert!(config.is_org_required);
        assert_eq!(config.scratch_org_edition, Some(OrgEdition::Enterprise));
        assert_eq!(
            config.project_config,
            ProjectConfig::Named {
                github_repo_url: "https://github.com/trailheadapps/dreamhouse-lwc.git".to_string(),
                folder_path: None,
            }
        );
    }

    #[test]
    fn test_requirement_file_with_invalid_shape_fails() {
        let err = TestRequirementConfig::from_toml_str(
            r#"
            testSuiteSuffixName = "x"
            [projectConfig]
            projectShape = "ANY"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("folderPath"));
    }

    #[test]
    fn test_org_edition_parse() {
        assert_eq!("Developer".parse::<OrgEdition>().unwrap(), OrgEdition::Developer);
        assert_eq!(OrgEdition::Enterprise.to_string(), "enterprise");
        assert!("partner".parse::<OrgEdition>().is_err());
    }

    #[tokio::test]
    async fn test_none_computes_path_without_side_effects() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let runner = MockRunner::new();
        let sf = SfCli::new(&runner);

        let outcome = set_up_testing_workspace(&settings, &sf, &ProjectConfig::None, "Settings")
            .await
            .unwrap();
        assert_eq!(outcome.path, settings.temp_folder.join("TempProject-Settings"));
        assert!(!outcome.needs_open);
        assert!(runner.history().is_empty());
        assert!(!settings.temp_folder.exists());
    }

    #[tokio::test]
    async fn test_new_generates_project() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let runner = MockRunner::new();
        let sf = SfCli::new(&runner);

        let outcome = set_up_testing_workspace(&settings, &sf, &ProjectConfig::New, "Lwc")
            .await
            .unwrap();
        assert_eq!(outcome.path, settings.temp_folder.join("TempProject-Lwc"));
        assert!(outcome.needs_open);
        let calls = runner.calls_to("project:generate");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].has_flag_value("--name", "TempProject-Lwc"));
        assert!(calls[0].has_flag_value("--template", "standard"));
    }

    #[tokio::test]
    async fn test_named_unreachable_fails_before_clone() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let runner = MockRunner::new();
        runner.respond_err("ls-remote", 128, "fatal: repository not found");
        let sf = SfCli::new(&runner);
        let config = ProjectConfig::Named {
            github_repo_url: "https://x/y.git".to_string(),
            folder_path: None,
        };

        let err = set_up_testing_workspace(&settings, &sf, &config, "S")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist or is inaccessible"));
        assert!(!runner.was_called("clone"));
        assert!(!settings.temp_folder.exists());
    }

    #[tokio::test]
    async fn test_named_folder_mismatch() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let runner = MockRunner::new();
        let sf = SfCli::new(&runner);
        let config = ProjectConfig::Named {
            github_repo_url: "https://github.com/trailheadapps/dreamhouse-lwc.git".to_string(),
            folder_path: Some(PathBuf::from("/src/ebikes-lwc")),
        };

        let err = set_up_testing_workspace(&settings, &sf, &config, "S")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvostError::Workspace(WorkspaceError::FolderMismatch { .. })
        ));
        assert!(!runner.was_called("clone"));
    }

    #[tokio::test]
    async fn test_named_reuses_matching_folder() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let runner = MockRunner::new();
        let sf = SfCli::new(&runner);
        let config = ProjectConfig::Named {
            github_repo_url: "https://github.com/trailheadapps/dreamhouse-lwc.git".to_string(),
            folder_path: Some(PathBuf::from("/src/dreamhouse-lwc")),
        };

        let outcome = set_up_testing_workspace(&settings, &sf, &config, "S")
            .await
            .unwrap();
        assert_eq!(outcome.path, PathBuf::from("/src/dreamhouse-lwc"));
        assert!(runner.was_called("ls-remote"));
        assert!(!runner.was_called("clone"));
    }

    #[tokio::test]
    async fn test_named_clones_into_temp_folder() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let runner = MockRunner::new();
        runner.on_call(
            "clone",
            Arc::new(|call: &MockCall| {
                std::fs::create_dir_all(&call.args[2]).unwrap();
            }),
        );
        let sf = SfCli::new(&runner);
        let config = ProjectConfig::Named {
            github_repo_url: "https://github.com/trailheadapps/dreamhouse-lwc.git".to_string(),
            folder_path: None,
        };

        let outcome = set_up_testing_workspace(&settings, &sf, &config, "S")
            .await
            .unwrap();
        assert_eq!(outcome.path, settings.temp_folder.join("dreamhouse-lwc"));
        assert!(outcome.path.is_dir());
        assert!(outcome.needs_open);
    }

    #[tokio::test]
    async fn test_any_is_passthrough() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let runner = MockRunner::new();
        let sf = SfCli::new(&runner);
        let config = ProjectConfig::Any {
            folder_path: PathBuf::from("/work/my-project"),
        };

        let outcome = set_up_testing_workspace(&settings, &sf, &config, "S")
            .await
            .unwrap();
        assert_eq!(outcome.path, PathBuf::from("/work/my-project"));
        assert!(!outcome.needs_open);
        assert!(runner.history().is_empty());
    }

    #[tokio::test]
    async fn test_existing_project_overrides_shape() {
        let dir = TempDir::new().unwrap();
        let settings = EnvironmentSettings {
            use_existing_project: Some(PathBuf::from("/work/existing")),
            ..settings_in(dir.path())
        };
        let runner = MockRunner::new();
        let sf = SfCli::new(&runner);

        let outcome = set_up_testing_workspace(&settings, &sf, &ProjectConfig::New, "S")
            .await
            .unwrap();
        assert_eq!(outcome.path, PathBuf::from("/work/existing"));
        assert_eq!(outcome.shape, ProjectShapeOption::Any);
        assert!(!runner.was_called("project:generate"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_in_ide() {
        let ide = MockIde::new();
        open_in_ide(&ide, Path::new("/tmp/e2e-temp/TempProject-S"), WORKSPACE_OPEN_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(ide.opened_folders().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_in_ide_not_opened() {
        let ide = MockIde::new();
        ide.set_workspace_name(Some("previous"));
        ide.refuse_to_open_folders();

        let err = open_in_ide(&ide, Path::new("/tmp/TempProject-S"), Duration::from_secs(3))
            .await
            .unwrap_err();
        match err {
            ProvostError::Workspace(WorkspaceError::NotOpened { expected, actual }) => {
                assert_eq!(expected, "TempProject-S");
                assert_eq!(actual.as_deref(), Some("previous"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
