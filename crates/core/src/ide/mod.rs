//! IDE automation surface
//!
//! The running IDE is an external collaborator. [`IdeDriver`] names the
//! handful of affordances suite setup depends on: command palette, quick pick,
//! notifications, output panel, status bar, folder opening and extension-host
//! introspection. Concrete drivers (WebDriver bindings) live outside this
//! crate; [`mock::MockIde`] is a scriptable in-memory implementation.
//!
//! The submodules hold the polling primitives suites use to wait for UI
//! side effects.

pub mod mock;
pub mod notifications;
pub mod output;
pub mod status_bar;

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An entry in the IDE's status bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBarItem {
    /// The item's title attribute
    pub title: String,
}

/// An extension as listed by the running extension host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningExtension {
    /// Publisher-qualified id, e.g. `salesforce.salesforcedx-vscode-core`
    pub extension_id: String,
    /// Whether activation has completed
    pub activated: bool,
    /// Whether the host flagged the extension as misbehaving
    pub is_buggy: bool,
}

/// Automation driver for a running IDE instance
#[allow(async_fn_in_trait)]
pub trait IdeDriver {
    /// Run a command palette entry by its label
    async fn execute_command(&self, label: &str) -> Result<()>;

    /// Pick an entry in the currently open quick pick
    async fn select_quick_pick(&self, item: &str) -> Result<()>;

    /// Messages of all currently displayed notifications
    async fn notifications(&self) -> Result<Vec<String>>;

    /// Dismiss the first visible notification equal to `message`; false if none
    async fn dismiss_notification(&self, message: &str) -> Result<bool>;

    /// Show the output panel with `channel` selected
    async fn select_output_channel(&self, channel: &str) -> Result<()>;

    /// Full text of the output panel's selected channel
    ///
    /// Drivers typically focus the panel, select all and read the clipboard,
    /// since the UI exposes no direct text extraction.
    async fn output_panel_text(&self) -> Result<String>;

    /// All status bar entries
    async fn status_bar_items(&self) -> Result<Vec<StatusBarItem>>;

    /// Open `path` as the workspace folder
    async fn open_folder(&self, path: &Path) -> Result<()>;

    /// Name of the loaded workspace, if any
    async fn workspace_name(&self) -> Result<Option<String>>;

    /// Extensions reported by the running extension host
    async fn running_extensions(&self) -> Result<Vec<RunningExtension>>;

    /// Install (or reinstall) an extension from a VSIX file
    async fn install_extension(&self, vsix: &Path) -> Result<()>;
}

impl<T: IdeDriver> IdeDriver for &T {
    async fn execute_command(&self, label: &str) -> Result<()> {
        (*self).execute_command(label).await
    }

    async fn select_quick_pick(&self, item: &str) -> Result<()> {
        (*self).select_quick_pick(item).await
    }

    async fn notifications(&self) -> Result<Vec<String>> {
        (*self).notifications().await
    }

    async fn dismiss_notification(&self, message: &str) -> Result<bool> {
        (*self).dismiss_notification(message).await
    }

    async fn select_output_channel(&self, channel: &str) -> Result<()> {
        (*self).select_output_channel(channel).await
    }

    async fn output_panel_text(&self) -> Result<String> {
        (*self).output_panel_text().await
    }

    async fn status_bar_items(&self) -> Result<Vec<StatusBarItem>> {
        (*self).status_bar_items().await
    }

    async fn open_folder(&self, path: &Path) -> Result<()> {
        (*self).open_folder(path).await
    }

    async fn workspace_name(&self) -> Result<Option<String>> {
        (*self).workspace_name().await
    }

    async fn running_extensions(&self) -> Result<Vec<RunningExtension>> {
        (*self).running_extensions().await
    }

    async fn install_extension(&self, vsix: &Path) -> Result<()> {
        (*self).install_extension(vsix).await
    }
}
