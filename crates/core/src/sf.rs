//! Thin wrappers around the cloud CLI
//!
//! Each operation builds an argument list, runs it through a
//! [`CommandRunner`] and insists on a zero exit, turning anything else into a
//! [`CliError::NonZeroExit`] that carries the captured stderr.

use crate::errors::{CliError, Result};
use crate::process::{display_command, CliInvocationResult, CommandRunner, SpawnOptions};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, instrument};

/// Default program name of the cloud CLI
pub const SF_PROGRAM: &str = "sf";

/// Cloud CLI client
#[derive(Debug, Clone)]
pub struct SfCli<R> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> SfCli<R> {
    /// Create a client that invokes `sf`
    pub fn new(runner: R) -> Self {
        Self::with_program(runner, SF_PROGRAM)
    }

    /// Create a client that invokes a custom CLI binary
    pub fn with_program(runner: R, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// The underlying runner
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run an arbitrary sub-command without checking the exit code
    pub async fn run_raw(&self, args: Vec<String>, options: &SpawnOptions) -> Result<CliInvocationResult> {
        self.runner.run(&self.program, &args, options).await
    }

    async fn run_checked(&self, args: Vec<String>) -> Result<CliInvocationResult> {
        let command = display_command(&self.program, &args);
        let result = self.run_raw(args, &SpawnOptions::default()).await?;
        result.ensure_success(&command)
    }

    async fn run_json(&self, args: Vec<String>) -> Result<Value> {
        let command = display_command(&self.program, &args);
        let result = self.run_checked(args).await?;
        parse_json_result(&command, &result.stdout)
    }

    /// `org:login:sfdx-url -d -f <file>`: authorize the org described by an auth file
    #[instrument(skip(self))]
    pub async fn org_login_sfdx_url(&self, auth_file: &Path) -> Result<CliInvocationResult> {
        self.run_checked(args([
            "org:login:sfdx-url",
            "-d",
            "-f",
            &auth_file.to_string_lossy(),
        ]))
        .await
    }

    /// `org:display --target-org <name> [--verbose] --json`
    #[instrument(skip(self))]
    pub async fn org_display(&self, target_org: &str, verbose: bool) -> Result<Value> {
        let mut argv = args(["org:display", "--target-org", target_org]);
        if verbose {
            argv.push("--verbose".to_string());
        }
        argv.push("--json".to_string());
        self.run_json(argv).await
    }

    /// `org:list --json`
    #[instrument(skip(self))]
    pub async fn org_list(&self) -> Result<Value> {
        self.run_json(args(["org:list", "--json"])).await
    }

    /// `org:create:scratch`, always with `--set-default --json`
    ///
    /// Returns the raw invocation result; the caller validates the payload.
    #[instrument(skip(self))]
    pub async fn scratch_org_create(
        &self,
        edition: &str,
        definition_file: Option<&Path>,
        alias: &str,
        duration_days: u32,
    ) -> Result<CliInvocationResult> {
        let mut argv = args(["org:create:scratch", "--edition", edition]);
        if let Some(file) = definition_file {
            argv.push("--definition-file".to_string());
            argv.push(file.to_string_lossy().into_owned());
        }
        argv.extend(args([
            "--alias",
            alias,
            "--duration-days",
            &duration_days.to_string(),
            "--set-default",
            "--json",
        ]));
        self.run_checked(argv).await
    }

    /// `alias:set <alias>=<username>`
    #[instrument(skip(self))]
    pub async fn alias_set(&self, alias: &str, username: &str) -> Result<CliInvocationResult> {
        self.run_checked(args(["alias:set", &format!("{}={}", alias, username)]))
            .await
    }

    /// Delete the dev hub's `ScratchOrgInfo` record for a scratch org
    #[instrument(skip(self))]
    pub async fn delete_scratch_org_info(
        &self,
        dev_hub: &str,
        scratch_org_record_id: &str,
    ) -> Result<CliInvocationResult> {
        self.run_checked(args([
            "data:delete:record",
            "--sobject",
            "ScratchOrgInfo",
            "--where",
            &format!("ScratchOrg={}", scratch_org_record_id),
            "--target-org",
            dev_hub,
        ]))
        .await
    }

    /// `org:delete:scratch --target-org <alias> --no-prompt`
    #[instrument(skip(self))]
    pub async fn org_delete_scratch(&self, alias: &str) -> Result<CliInvocationResult> {
        self.run_checked(args([
            "org:delete:scratch",
            "--target-org",
            alias,
            "--no-prompt",
        ]))
        .await
    }

    /// `project:generate` with the standard template
    #[instrument(skip(self))]
    pub async fn generate_project(&self, name: &str, output_dir: &Path) -> Result<CliInvocationResult> {
        debug!("Generating project {} under {}", name, output_dir.display());
        self.run_checked(args([
            "project:generate",
            "--name",
            name,
            "--output-dir",
            &output_dir.to_string_lossy(),
            "--template",
            "standard",
        ]))
        .await
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Parse `{ "result": ... }` JSON output and return the `result` member
pub fn parse_json_result(command: &str, stdout: &str) -> Result<Value> {
    let mut parsed: Value = serde_json::from_str(stdout.trim()).map_err(|e| CliError::InvalidJson {
        command: command.to_string(),
        message: e.to_string(),
    })?;
    match parsed.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(CliError::InvalidJson {
            command: command.to_string(),
            message: "missing 'result' member".to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProvostError;
    use crate::process::mock::MockRunner;

    #[test]
    fn test_parse_json_result() {
        let value = parse_json_result("sf x", r#"{"status":0,"result":{"orgId":"00D"}}"#).unwrap();
        assert_eq!(value["orgId"], "00D");

        let err = parse_json_result("sf x", r#"{"status":0}"#).unwrap_err();
        assert!(err.to_string().contains("missing 'result'"));

        let err = parse_json_result("sf x", "not json").unwrap_err();
        assert!(matches!(err, ProvostError::Cli(CliError::InvalidJson { .. })));
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let runner = MockRunner::new();
        runner.respond_err("org:delete:scratch", 1, "No scratch org found");
        let sf = SfCli::new(&runner);

        let err = sf.org_delete_scratch("foo").await.unwrap_err();
        match err {
            ProvostError::Cli(CliError::NonZeroExit {
                command,
                exit_code,
                stderr,
            }) => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "No scratch org found");
                assert!(command.starts_with("sf org:delete:scratch"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scratch_org_create_arguments() {
        let runner = MockRunner::new();
        runner.respond_ok("org:create:scratch", r#"{"result":{}}"#);
        let sf = SfCli::new(&runner);

        let result = sf
            .scratch_org_create("developer", Some(Path::new("config/def.json")), "foo", 1)
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);

        let call = &runner.calls_to("org:create:scratch")[0];
        assert!(call.has_flag_value("--edition", "developer"));
        assert!(call.has_flag_value("--definition-file", "config/def.json"));
        assert!(call.has_flag_value("--alias", "foo"));
        assert!(call.has_flag_value("--duration-days", "1"));
        assert!(call.args.contains(&"--set-default".to_string()));
        assert!(call.args.contains(&"--json".to_string()));
    }

    #[tokio::test]
    async fn test_delete_scratch_org_info_arguments() {
        let runner = MockRunner::new();
        let sf = SfCli::new(&runner);
        sf.delete_scratch_org_info("vscodeOrg", "00D000000000001")
            .await
            .unwrap();

        let call = &runner.calls_to("data:delete:record")[0];
        assert!(call.has_flag_value("--sobject", "ScratchOrgInfo"));
        assert!(call.has_flag_value("--where", "ScratchOrg=00D000000000001"));
        assert!(call.has_flag_value("--target-org", "vscodeOrg"));
    }

    #[tokio::test]
    async fn test_custom_program() {
        let runner = MockRunner::new();
        let sf = SfCli::with_program(&runner, "/opt/sf/bin/sf");
        sf.alias_set("hub", "me@example.com").await.unwrap();
        let call = &runner.history()[0];
        assert_eq!(call.program, "/opt/sf/bin/sf");
        assert_eq!(call.args, vec!["alias:set", "hub=me@example.com"]);
    }
}
