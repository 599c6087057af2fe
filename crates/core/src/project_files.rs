//! In-place edits of project files the suites depend on

use crate::errors::{Result, WorkspaceError};
use crate::workspace::OrgEdition;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Scratch org definition file, relative to the workspace
pub const SCRATCH_DEF_RELATIVE_PATH: &str = "config/project-scratch-def.json";

/// Workspace settings file, relative to the workspace
pub const WORKSPACE_SETTINGS_RELATIVE_PATH: &str = ".vscode/settings.json";

/// Settings key holding the Java home used by the Apex language server
pub const JAVA_HOME_SETTING: &str = "salesforcedx-vscode-apex.java.home";

/// Path of the scratch org definition file in `workspace`
pub fn scratch_def_path(workspace: &Path) -> PathBuf {
    workspace.join(SCRATCH_DEF_RELATIVE_PATH)
}

fn read_json_object(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path).map_err(|source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    // Workspace settings may be empty right after project generation
    if content.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(WorkspaceError::ProjectFile {
            path: path.to_path_buf(),
            message: "expected a JSON object".to_string(),
        }
        .into()),
        Err(e) => Err(WorkspaceError::ProjectFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
        .into()),
    }
}

fn write_json_object(path: &Path, map: Map<String, Value>) -> Result<()> {
    let io_error = |source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut content = serde_json::to_string_pretty(&Value::Object(map)).map_err(|e| {
        WorkspaceError::ProjectFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;
    content.push('\n');
    std::fs::write(path, content).map_err(io_error)?;
    Ok(())
}

/// Rewrite `edition` in the workspace's scratch org definition
///
/// Other keys keep their order and values.
#[instrument]
pub fn set_scratch_org_edition(workspace: &Path, edition: OrgEdition) -> Result<()> {
    let path = scratch_def_path(workspace);
    let mut definition = read_json_object(&path)?;
    definition.insert("edition".to_string(), Value::String(edition.to_string()));
    write_json_object(&path, definition)?;
    debug!("Set scratch org edition to {} in {}", edition, path.display());
    Ok(())
}

/// Point the Apex language server at `java_home` through workspace settings
#[instrument]
pub fn set_java_home(workspace: &Path, java_home: &str) -> Result<()> {
    let path = workspace.join(WORKSPACE_SETTINGS_RELATIVE_PATH);
    let mut settings = if path.exists() {
        read_json_object(&path)?
    } else {
        Map::new()
    };
    settings.insert(
        JAVA_HOME_SETTING.to_string(),
        Value::String(java_home.to_string()),
    );
    write_json_object(&path, settings)?;
    debug!("Set {} in {}", JAVA_HOME_SETTING, path.display());
    Ok(())
}
