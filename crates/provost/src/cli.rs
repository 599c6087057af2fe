use crate::commands;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use provost_core::settings::{is_debug_flag, EnvironmentSettings};
use provost_core::workspace::OrgEdition;
use std::path::PathBuf;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
    /// TOML format
    Toml,
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

/// Scratch org edition accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EditionArg {
    Developer,
    Enterprise,
}

impl From<EditionArg> for OrgEdition {
    fn from(edition: EditionArg) -> Self {
        match edition {
            EditionArg::Developer => OrgEdition::Developer,
            EditionArg::Enterprise => OrgEdition::Enterprise,
        }
    }
}

/// Options shared by every subcommand
#[derive(Debug, Clone)]
pub struct CliContext {
    /// Cloud CLI executable
    pub sf_path: String,
}

/// Test environment provisioning CLI
#[derive(Debug, Parser)]
#[command(name = "provost")]
#[command(version)]
#[command(about = "Test environment manager for IDE end-to-end suites")]
#[command(
    long_about = "Test environment manager for IDE end-to-end suites\n\n\
    Runs the command-line halves of suite setup by hand: inspect resolved settings, \
    prepare a workspace, authorize the dev hub, and create or delete scratch orgs."
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via PROVOST_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Path to the cloud CLI executable
    #[arg(long, global = true, default_value = provost_core::sf::SF_PROGRAM)]
    pub sf_path: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the settings resolved from the environment
    Settings {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Resolve (and create or clone if needed) the workspace for a suite
    PrepareWorkspace {
        /// Suite requirement file (TOML)
        #[arg(long, value_name = "PATH")]
        requirements: PathBuf,
    },

    /// Verify the configured dev hub and log it in
    AuthorizeDevHub {
        /// Workspace in which the temporary auth file is written
        #[arg(long, value_name = "PATH")]
        workspace: PathBuf,
    },

    /// Create a scratch org and make it the CLI default
    CreateScratchOrg {
        /// Workspace holding config/project-scratch-def.json
        #[arg(long, value_name = "PATH")]
        workspace: PathBuf,

        /// Scratch org edition
        #[arg(long, value_enum, default_value = "developer")]
        edition: EditionArg,

        /// Suite suffix appended to the alias
        #[arg(long, default_value = "Manual")]
        suffix: String,
    },

    /// Delete a scratch org and, given its id, its dev hub registration
    DeleteScratchOrg {
        /// Scratch org alias
        #[arg(long)]
        alias: String,

        /// Scratch org id, used to remove the ScratchOrgInfo record
        #[arg(long)]
        org_id: Option<String>,
    },
}

impl Cli {
    pub async fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };

        let mut log_level = match self.log_level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        // Read directly so settings warnings are emitted after logging is up
        let debug = std::env::var("E2E_DEBUG").is_ok_and(|v| is_debug_flag(&v));
        if debug && matches!(self.log_level, LogLevel::Info) {
            log_level = "debug";
        }

        if std::env::var_os("PROVOST_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("provost={},provost_core={}", log_level, log_level),
            );
        }
        provost_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);
        let settings = EnvironmentSettings::global();

        let context = CliContext {
            sf_path: self.sf_path,
        };

        match self.command {
            Some(Commands::Settings { format }) => commands::settings::execute(settings, format),
            Some(Commands::PrepareWorkspace { requirements }) => {
                commands::workspace::execute(&context, settings, &requirements).await
            }
            Some(Commands::AuthorizeDevHub { workspace }) => {
                commands::org::authorize(&context, settings, &workspace).await
            }
            Some(Commands::CreateScratchOrg {
                workspace,
                edition,
                suffix,
            }) => commands::org::create(&context, &workspace, edition.into(), &suffix).await,
            Some(Commands::DeleteScratchOrg { alias, org_id }) => {
                commands::org::delete(&context, settings, &alias, org_id.as_deref()).await
            }
            None => {
                println!("Test environment manager for IDE end-to-end suites");
                println!("Run 'provost --help' to see available commands.");
                Ok(())
            }
        }
    }
}
