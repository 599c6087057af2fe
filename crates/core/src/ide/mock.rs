//! Scriptable in-memory IDE for testing setup flows and polling primitives
//!
//! UI state (notifications, status bar entries, output lines) is scheduled on
//! the tokio clock, so tests running with paused time can make things appear
//! or disappear "later" without real sleeps. Command and quick-pick reactions
//! let a test script what the IDE would do in response to a palette command.

use super::{IdeDriver, RunningExtension, StatusBarItem};
use crate::errors::{ProvostError, Result};
use crate::ide::output::CLEAR_OUTPUT_COMMAND;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Reaction to a command palette entry
pub type CommandReaction = Arc<dyn Fn(&MockIde) + Send + Sync>;

/// Reaction to a quick pick selection; receives the selected item
pub type QuickPickReaction = Arc<dyn Fn(&MockIde, &str) + Send + Sync>;

#[derive(Debug, Clone)]
struct TimedEntry {
    text: String,
    visible_from: Instant,
    visible_until: Option<Instant>,
}

impl TimedEntry {
    fn new(text: &str, visible_from: Instant) -> Self {
        Self {
            text: text.to_string(),
            visible_from,
            visible_until: None,
        }
    }

    fn is_visible(&self, now: Instant) -> bool {
        now >= self.visible_from && self.visible_until.map_or(true, |until| now < until)
    }
}

#[derive(Default)]
struct MockIdeState {
    notifications: Vec<TimedEntry>,
    status_bar: Vec<TimedEntry>,
    output: HashMap<String, Vec<TimedEntry>>,
    selected_channel: Option<String>,
    workspace_name: Option<String>,
    refuse_open: bool,
    opened_folders: Vec<PathBuf>,
    running_extensions: Vec<RunningExtension>,
    installed: Vec<PathBuf>,
    commands: Vec<String>,
    quick_picks: Vec<String>,
    command_reactions: HashMap<String, CommandReaction>,
    quick_pick_reaction: Option<QuickPickReaction>,
    fail_next: Option<String>,
}

/// Mock IDE driver
#[derive(Clone, Default)]
pub struct MockIde {
    state: Arc<Mutex<MockIdeState>>,
}

impl std::fmt::Debug for MockIde {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockIde").finish_non_exhaustive()
    }
}

impl MockIde {
    /// Create an IDE with nothing open and nothing displayed
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockIdeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn take_failure(&self) -> Result<()> {
        match self.with_state(|s| s.fail_next.take()) {
            Some(message) => Err(ProvostError::Ide(message)),
            None => Ok(()),
        }
    }

    /// Make the next driver call fail with `message`
    pub fn fail_next_call(&self, message: &str) {
        self.with_state(|s| s.fail_next = Some(message.to_string()));
    }

    /// Display a notification now
    pub fn show_notification(&self, message: &str) {
        self.show_notification_after(message, Duration::ZERO);
    }

    /// Display a notification after `delay`
    pub fn show_notification_after(&self, message: &str, delay: Duration) {
        let at = Instant::now() + delay;
        self.with_state(|s| s.notifications.push(TimedEntry::new(message, at)));
    }

    /// Hide every notification equal to `message` after `delay`
    pub fn hide_notification_after(&self, message: &str, delay: Duration) {
        let at = Instant::now() + delay;
        self.with_state(|s| {
            for entry in s.notifications.iter_mut().filter(|e| e.text == message) {
                entry.visible_until = Some(at);
            }
        });
    }

    /// Add a status bar item now
    pub fn add_status_bar_item(&self, title: &str) {
        self.add_status_bar_item_after(title, Duration::ZERO);
    }

    /// Add a status bar item after `delay`
    pub fn add_status_bar_item_after(&self, title: &str, delay: Duration) {
        let at = Instant::now() + delay;
        self.with_state(|s| s.status_bar.push(TimedEntry::new(title, at)));
    }

    /// Append a line to an output channel now
    pub fn append_output(&self, channel: &str, line: &str) {
        self.append_output_after(channel, line, Duration::ZERO);
    }

    /// Append a line to an output channel after `delay`
    pub fn append_output_after(&self, channel: &str, line: &str, delay: Duration) {
        let at = Instant::now() + delay;
        self.with_state(|s| {
            s.output
                .entry(channel.to_string())
                .or_default()
                .push(TimedEntry::new(line, at))
        });
    }

    /// Report `name` as the loaded workspace
    pub fn set_workspace_name(&self, name: Option<&str>) {
        self.with_state(|s| s.workspace_name = name.map(str::to_string));
    }

    /// Ignore `open_folder` requests (the workspace name stays unchanged)
    pub fn refuse_to_open_folders(&self) {
        self.with_state(|s| s.refuse_open = true);
    }

    /// Replace the running extension list
    pub fn set_running_extensions(&self, extensions: Vec<RunningExtension>) {
        self.with_state(|s| s.running_extensions = extensions);
    }

    /// React to a command palette entry
    pub fn on_command(&self, label: &str, reaction: CommandReaction) {
        self.with_state(|s| {
            s.command_reactions.insert(label.to_string(), reaction);
        });
    }

    /// React to any quick pick selection
    pub fn on_quick_pick(&self, reaction: QuickPickReaction) {
        self.with_state(|s| s.quick_pick_reaction = Some(reaction));
    }

    /// Command palette entries executed so far
    pub fn executed_commands(&self) -> Vec<String> {
        self.with_state(|s| s.commands.clone())
    }

    /// Quick pick items selected so far
    pub fn selected_quick_picks(&self) -> Vec<String> {
        self.with_state(|s| s.quick_picks.clone())
    }

    /// Folders the IDE was asked to open
    pub fn opened_folders(&self) -> Vec<PathBuf> {
        self.with_state(|s| s.opened_folders.clone())
    }

    /// VSIX files installed
    pub fn installed_extensions(&self) -> Vec<PathBuf> {
        self.with_state(|s| s.installed.clone())
    }

    /// Currently selected output channel
    pub fn selected_output_channel(&self) -> Option<String> {
        self.with_state(|s| s.selected_channel.clone())
    }
}

impl IdeDriver for MockIde {
    async fn execute_command(&self, label: &str) -> Result<()> {
        self.take_failure()?;
        debug!("MockIde execute_command: {}", label);
        let reaction = self.with_state(|s| {
            s.commands.push(label.to_string());
            if label == CLEAR_OUTPUT_COMMAND {
                if let Some(channel) = s.selected_channel.clone() {
                    s.output.remove(&channel);
                }
            }
            s.command_reactions.get(label).cloned()
        });
        if let Some(reaction) = reaction {
            reaction(self);
        }
        Ok(())
    }

    async fn select_quick_pick(&self, item: &str) -> Result<()> {
        self.take_failure()?;
        let reaction = self.with_state(|s| {
            s.quick_picks.push(item.to_string());
            s.quick_pick_reaction.clone()
        });
        if let Some(reaction) = reaction {
            reaction(self, item);
        }
        Ok(())
    }

    async fn notifications(&self) -> Result<Vec<String>> {
        self.take_failure()?;
        let now = Instant::now();
        Ok(self.with_state(|s| {
            s.notifications
                .iter()
                .filter(|e| e.is_visible(now))
                .map(|e| e.text.clone())
                .collect()
        }))
    }

    async fn dismiss_notification(&self, message: &str) -> Result<bool> {
        self.take_failure()?;
        let now = Instant::now();
        Ok(self.with_state(|s| {
            match s
                .notifications
                .iter_mut()
                .find(|e| e.text == message && e.is_visible(now))
            {
                Some(entry) => {
                    entry.visible_until = Some(now);
                    true
                }
                None => false,
            }
        }))
    }

    async fn select_output_channel(&self, channel: &str) -> Result<()> {
        self.take_failure()?;
        self.with_state(|s| s.selected_channel = Some(channel.to_string()));
        Ok(())
    }

    async fn output_panel_text(&self) -> Result<String> {
        self.take_failure()?;
        let now = Instant::now();
        Ok(self.with_state(|s| {
            let Some(channel) = &s.selected_channel else {
                return String::new();
            };
            s.output
                .get(channel)
                .map(|lines| {
                    lines
                        .iter()
                        .filter(|e| e.is_visible(now))
                        .map(|e| e.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default()
        }))
    }

    async fn status_bar_items(&self) -> Result<Vec<StatusBarItem>> {
        self.take_failure()?;
        let now = Instant::now();
        Ok(self.with_state(|s| {
            s.status_bar
                .iter()
                .filter(|e| e.is_visible(now))
                .map(|e| StatusBarItem {
                    title: e.text.clone(),
                })
                .collect()
        }))
    }

    async fn open_folder(&self, path: &Path) -> Result<()> {
        self.take_failure()?;
        self.with_state(|s| {
            s.opened_folders.push(path.to_path_buf());
            if !s.refuse_open {
                s.workspace_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
            }
        });
        Ok(())
    }

    async fn workspace_name(&self) -> Result<Option<String>> {
        self.take_failure()?;
        Ok(self.with_state(|s| s.workspace_name.clone()))
    }

    async fn running_extensions(&self) -> Result<Vec<RunningExtension>> {
        self.take_failure()?;
        Ok(self.with_state(|s| s.running_extensions.clone()))
    }

    async fn install_extension(&self, vsix: &Path) -> Result<()> {
        self.take_failure()?;
        self.with_state(|s| s.installed.push(vsix.to_path_buf()));
        Ok(())
    }
}
