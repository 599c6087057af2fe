//! Error types and handling
//!
//! The taxonomy follows the phases of a suite run: configuration problems,
//! precondition failures while preparing the workspace, failures of the cloud
//! CLI, malformed-but-successful CLI results, and regressions detected at
//! teardown. Domain enums are wrapped in [`ProvostError`] for unified handling.
//!
//! UI-timing timeouts are deliberately absent: polling primitives report them
//! as values (see [`crate::polling::PollOutcome`]) and the caller decides.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A setting required by the current operation resolved to an empty value
    #[error("Required setting {variable} is not set")]
    MissingSetting { variable: &'static str },

    /// Test requirement file could not be parsed
    #[error("Failed to parse test requirement file: {message}")]
    Parsing { message: String },

    /// Test requirement file I/O error
    #[error("Failed to read test requirement file")]
    Io(#[from] std::io::Error),
}

/// Cloud CLI and child-process errors
#[derive(Error, Debug)]
pub enum CliError {
    /// The child process could not be started at all
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited non-zero
    #[error("Command '{command}' failed with exit code {exit_code}: {stderr}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The command's JSON output could not be parsed
    #[error("Failed to parse JSON output of '{command}': {message}")]
    InvalidJson { command: String, message: String },
}

/// Workspace provisioning precondition errors
#[derive(Error, Debug)]
pub enum WorkspaceError {
    /// A NAMED project shape was requested without a repository URL
    #[error("A NAMED project requires a githubRepoUrl")]
    MissingRepoUrl,

    /// An ANY project shape was requested without a folder path
    #[error("An ANY project requires a folderPath")]
    MissingFolderPath,

    /// The project shape tag is not one of NEW, NAMED, ANY, NONE
    #[error("Unsupported project shape: {shape}")]
    UnsupportedShape { shape: String },

    /// The remote repository could not be reached
    #[error("Repository {url} does not exist or is inaccessible")]
    RepoUnreachable { url: String },

    /// A local folder was supplied whose name differs from the repository's
    #[error("Folder '{folder}' does not match repository name '{repo_name}'")]
    FolderMismatch { folder: String, repo_name: String },

    /// The IDE did not load the expected project after being told to open it
    #[error("IDE did not open project '{expected}' (last seen: {actual:?})")]
    NotOpened {
        expected: String,
        actual: Option<String>,
    },

    /// Filesystem error while preparing the workspace
    #[error("Workspace file operation failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A project file under the workspace could not be read or rewritten
    #[error("Invalid project file {}: {message}", path.display())]
    ProjectFile { path: PathBuf, message: String },
}

/// Dev hub and scratch org errors
#[derive(Error, Debug)]
pub enum OrgError {
    /// The configured dev hub is not registered with the CLI
    #[error(
        "Dev hub not found: no org with alias '{alias}' and username '{username}'. \
         Check DEV_HUB_ALIAS_NAME and DEV_HUB_USER_NAME"
    )]
    DevHubNotFound { alias: String, username: String },

    /// The CLI exited 0 but its result lacks fields a usable org must have
    #[error("Scratch org provisioning incomplete, missing: {}", missing.join(", "))]
    IncompleteProvisioning { missing: Vec<&'static str> },

    /// The IDE never showed that the scratch org became the default target
    #[error("IDE did not confirm default org '{alias}': {what}")]
    NotConfirmedInIde { alias: String, what: String },
}

/// Errors raised by blocking wait helpers
#[derive(Error, Debug)]
pub enum PollError {
    /// Something that had to appear or disappear did not within the deadline
    #[error("Timed out after {elapsed:?} waiting for {what}")]
    TimedOut {
        what: String,
        elapsed: std::time::Duration,
    },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum ProvostError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cloud CLI errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// Workspace precondition errors
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Org errors
    #[error("Org error: {0}")]
    Org(#[from] OrgError),

    /// Wait helper errors
    #[error("Wait error: {0}")]
    Poll(#[from] PollError),

    /// IDE automation errors surfaced by a driver
    #[error("IDE error: {0}")]
    Ide(String),

    /// Extensions reported as buggy by the running extension host
    #[error("Buggy extensions detected: {}", extensions.join(", "))]
    Regression { extensions: Vec<String> },
}

/// Convenience type alias for Results with ProvostError
pub type Result<T> = std::result::Result<T, ProvostError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingSetting {
            variable: "DEV_HUB_ALIAS_NAME",
        };
        assert_eq!(
            format!("{}", error),
            "Required setting DEV_HUB_ALIAS_NAME is not set"
        );
    }

    #[test]
    fn test_cli_error_includes_stderr() {
        let error = CliError::NonZeroExit {
            command: "sf org:list --json".to_string(),
            exit_code: 1,
            stderr: "No authorization information found".to_string(),
        };
        let text = error.to_string();
        assert!(text.contains("exit code 1"));
        assert!(text.contains("No authorization information found"));
    }

    #[test]
    fn test_workspace_error_display() {
        let error = WorkspaceError::RepoUnreachable {
            url: "https://x/y.git".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Repository https://x/y.git does not exist or is inaccessible"
        );

        let error = WorkspaceError::FolderMismatch {
            folder: "other".to_string(),
            repo_name: "dreamhouse-lwc".to_string(),
        };
        assert!(error.to_string().contains("dreamhouse-lwc"));
    }

    #[test]
    fn test_org_error_names_both_settings() {
        let error = OrgError::DevHubNotFound {
            alias: "hub".to_string(),
            username: "me@example.com".to_string(),
        };
        let text = error.to_string();
        assert!(text.contains("DEV_HUB_ALIAS_NAME"));
        assert!(text.contains("DEV_HUB_USER_NAME"));
        assert!(text.contains("me@example.com"));
    }

    #[test]
    fn test_incomplete_provisioning_lists_fields() {
        let error = OrgError::IncompleteProvisioning {
            missing: vec!["accessToken", "orgId"],
        };
        assert_eq!(
            error.to_string(),
            "Scratch org provisioning incomplete, missing: accessToken, orgId"
        );
    }

    #[test]
    fn test_provost_error_from_domain_errors() {
        let error: ProvostError = WorkspaceError::MissingRepoUrl.into();
        assert!(matches!(error, ProvostError::Workspace(_)));

        let error: ProvostError = OrgError::IncompleteProvisioning { missing: vec![] }.into();
        assert!(matches!(error, ProvostError::Org(_)));

        let error: ProvostError = ConfigError::MissingSetting { variable: "X" }.into();
        assert!(matches!(error, ProvostError::Config(_)));
    }

    #[test]
    fn test_error_source_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = ProvostError::Cli(CliError::SpawnFailed {
            program: "sf".to_string(),
            source: io_error,
        });
        let source = error.source().expect("cli error source");
        assert!(source.source().is_some());
    }

    #[test]
    fn test_anyhow_conversion() {
        let error = ProvostError::Regression {
            extensions: vec!["salesforce.salesforcedx-vscode-apex".to_string()],
        };
        let anyhow_error = anyhow::Error::from(error);
        assert!(anyhow_error.to_string().contains("Buggy extensions"));
    }
}
