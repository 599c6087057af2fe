//! Disposable scratch org provisioning

use crate::errors::{OrgError, Result};
use crate::ide::notifications::{notification_is_present_with_timeout, NotificationMatch};
use crate::ide::status_bar::get_status_bar_item_which_includes;
use crate::ide::IdeDriver;
use crate::process::CommandRunner;
use crate::project_files::scratch_def_path;
use crate::sf::{parse_json_result, SfCli};
use crate::workspace::OrgEdition;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Scratch orgs outlive a suite by at most this many days
pub const SCRATCH_ORG_DURATION_DAYS: u32 = 1;

/// Command palette entry that picks the default org
pub const SET_DEFAULT_ORG_COMMAND: &str = "SFDX: Set a Default Org";

/// Notification shown once the default org is switched
pub const SET_DEFAULT_ORG_SUCCESS: &str = "SFDX: Set a Default Org successfully ran";

/// Budget for the IDE to catch up with a new default org
pub const DEFAULT_ORG_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// The scratch org a suite runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScratchOrgIdentity {
    pub alias_name: String,
    pub org_id: String,
    pub signup_email: String,
}

/// Alias for a new scratch org
///
/// `TempScratchOrg_<YYYY>_<MM>_<DD>_<user>_<epochMillis>_<suffix>`; the
/// millisecond timestamp keeps aliases distinct across rapid runs.
pub fn scratch_org_alias(now: DateTime<Local>, os_user: &str, suffix: &str) -> String {
    format!(
        "TempScratchOrg_{}_{}_{}_{}",
        now.format("%Y_%m_%d"),
        os_user,
        now.timestamp_millis(),
        suffix
    )
}

/// Login name of the current OS user
pub fn os_user_name() -> String {
    ["USER", "USERNAME"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn non_empty_str<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Create a scratch org from the workspace's definition file and make it the CLI default
#[instrument(skip(sf))]
pub async fn create_default_scratch_org<R: CommandRunner>(
    sf: &SfCli<R>,
    edition: OrgEdition,
    workspace: &Path,
    suffix: &str,
) -> Result<ScratchOrgIdentity> {
    let alias = scratch_org_alias(Local::now(), &os_user_name(), suffix);
    let definition = scratch_def_path(workspace);
    let definition = if definition.exists() {
        Some(definition)
    } else {
        warn!("No scratch org definition at {}", definition.display());
        None
    };

    info!("Creating {} scratch org {}", edition, alias);
    let output = sf
        .scratch_org_create(
            edition.as_str(),
            definition.as_deref(),
            &alias,
            SCRATCH_ORG_DURATION_DAYS,
        )
        .await?;
    let result = parse_json_result("org:create:scratch", &output.stdout)?;

    let access_token = non_empty_str(&result, "/authFields/accessToken");
    let org_id = non_empty_str(&result, "/orgId");
    let signup_email = non_empty_str(&result, "/scratchOrgInfo/SignupEmail");

    let (Some(access_token), Some(org_id), Some(signup_email)) = (access_token, org_id, signup_email)
    else {
        let missing: Vec<&'static str> = [
            ("accessToken", access_token),
            ("orgId", org_id),
            ("SignupEmail", signup_email),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect();
        let err = OrgError::IncompleteProvisioning { missing };
        error!("{}", err);
        return Err(err.into());
    };

    crate::redaction::add_global_secret(access_token);
    info!("Scratch org {} created ({})", alias, org_id);
    Ok(ScratchOrgIdentity {
        alias_name: alias,
        org_id: org_id.to_string(),
        signup_email: signup_email.to_string(),
    })
}

/// Make `alias` the IDE's default org and wait for the UI to show it
#[instrument(skip(ide))]
pub async fn confirm_default_org_in_ide<I: IdeDriver>(ide: &I, alias: &str, timeout: Duration) -> Result<()> {
    ide.execute_command(SET_DEFAULT_ORG_COMMAND).await?;
    ide.select_quick_pick(alias).await?;

    let not_confirmed = |what: &str| {
        let err = OrgError::NotConfirmedInIde {
            alias: alias.to_string(),
            what: what.to_string(),
        };
        error!("{}", err);
        err
    };

    if !notification_is_present_with_timeout(ide, SET_DEFAULT_ORG_SUCCESS, NotificationMatch::Exact, timeout).await? {
        return Err(not_confirmed("no success notification").into());
    }
    if get_status_bar_item_which_includes(ide, alias).await?.is_none() {
        return Err(not_confirmed("no status bar item").into());
    }
    info!("IDE default org is {}", alias);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProvostError;
    use crate::ide::mock::MockIde;
    use crate::process::mock::MockRunner;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    const CREATE_OUTPUT: &str = r#"{"status":0,"result":{
        "orgId":"00D8H0000001AbCUAU",
        "username":"test-abc@example.com",
        "authFields":{"accessToken":"00D8H0000001AbC!AQEAQtokenvalue"},
        "scratchOrgInfo":{"Id":"2SR8H0000001xyz","SignupEmail":"svcideebot@salesforce.com"}
    }}"#;

    #[test]
    fn test_alias_format() {
        let now = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 0).unwrap();
        let alias = scratch_org_alias(now, "jdoe", "ApexLsp");
        assert_eq!(
            alias,
            format!("TempScratchOrg_2026_03_07_jdoe_{}_ApexLsp", now.timestamp_millis())
        );
    }

    #[test]
    fn test_aliases_differ_by_millisecond() {
        let base = Local.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let aliases: HashSet<String> = (0..50)
            .map(|ms| scratch_org_alias(base + chrono::Duration::milliseconds(ms), "ci", "Suite"))
            .collect();
        assert_eq!(aliases.len(), 50);
    }

    #[test]
    #[serial_test::serial]
    fn test_os_user_name_fallbacks() {
        let saved: Vec<_> = ["USER", "USERNAME"]
            .iter()
            .map(|name| (*name, std::env::var_os(name)))
            .collect();

        std::env::set_var("USER", "");
        std::env::set_var("USERNAME", "winuser");
        assert_eq!(os_user_name(), "winuser");

        std::env::remove_var("USERNAME");
        assert_eq!(os_user_name(), "unknown");

        std::env::set_var("USER", "jdoe");
        assert_eq!(os_user_name(), "jdoe");

        for (name, value) in saved {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }

    #[tokio::test]
    async fn test_create_default_scratch_org() {
        let dir = TempDir::new().unwrap();
        let def = scratch_def_path(dir.path());
        std::fs::create_dir_all(def.parent().unwrap()).unwrap();
        std::fs::write(&def, r#"{"edition":"Developer"}"#).unwrap();

        let runner = MockRunner::new();
        runner.respond_ok("org:create:scratch", CREATE_OUTPUT);
        let sf = SfCli::new(&runner);

        let identity = create_default_scratch_org(&sf, OrgEdition::Developer, dir.path(), "Suite")
            .await
            .unwrap();
        assert!(identity.alias_name.starts_with("TempScratchOrg_"));
        assert!(identity.alias_name.ends_with("_Suite"));
        assert_eq!(identity.org_id, "00D8H0000001AbCUAU");

        let call = &runner.calls_to("org:create:scratch")[0];
        assert!(call.has_flag_value("--alias", &identity.alias_name));
        assert!(call.has_flag_value("--definition-file", &def.to_string_lossy()));
        assert!(call.has_flag_value("--duration-days", "1"));
        assert!(crate::redaction::redact("token 00D8H0000001AbC!AQEAQtokenvalue").contains("****"));
    }

    #[tokio::test]
    async fn test_incomplete_provisioning_lists_missing_fields() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new();
        runner.respond_ok(
            "org:create:scratch",
            r#"{"status":0,"result":{"orgId":"00D000000000001","authFields":{"accessToken":""}}}"#,
        );
        let sf = SfCli::new(&runner);

        let err = create_default_scratch_org(&sf, OrgEdition::Enterprise, dir.path(), "S")
            .await
            .unwrap_err();
        match err {
            ProvostError::Org(OrgError::IncompleteProvisioning { missing }) => {
                assert_eq!(missing, vec!["accessToken", "SignupEmail"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let call = &runner.calls_to("org:create:scratch")[0];
        assert!(!call.args.contains(&"--definition-file".to_string()));
    }

    #[tokio::test]
    async fn test_creation_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new();
        runner.respond_err("org:create:scratch", 1, "The signup request failed");
        let sf = SfCli::new(&runner);

        let err = create_default_scratch_org(&sf, OrgEdition::Developer, dir.path(), "S")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("The signup request failed"));
    }

    fn ide_that_switches_org() -> MockIde {
        let ide = MockIde::new();
        ide.on_quick_pick(Arc::new(|ide: &MockIde, alias: &str| {
            ide.show_notification_after(SET_DEFAULT_ORG_SUCCESS, Duration::from_secs(5));
            ide.add_status_bar_item_after(alias, Duration::from_secs(6));
        }));
        ide
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_default_org() {
        let ide = ide_that_switches_org();
        confirm_default_org_in_ide(&ide, "TempScratchOrg_x", DEFAULT_ORG_CONFIRM_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(ide.executed_commands(), vec![SET_DEFAULT_ORG_COMMAND]);
        assert_eq!(ide.selected_quick_picks(), vec!["TempScratchOrg_x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_default_org_without_notification() {
        let ide = MockIde::new();
        ide.add_status_bar_item("TempScratchOrg_x");
        let err = confirm_default_org_in_ide(&ide, "TempScratchOrg_x", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvostError::Org(OrgError::NotConfirmedInIde { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_default_org_without_status_bar_item() {
        let ide = MockIde::new();
        ide.show_notification(SET_DEFAULT_ORG_SUCCESS);
        let err = confirm_default_org_in_ide(&ide, "TempScratchOrg_x", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("status bar"));
    }
}
