//! Searching the status bar

use super::{IdeDriver, StatusBarItem};
use crate::errors::Result;
use crate::polling::{poll_attempts, DEFAULT_POLL_INTERVAL};
use tracing::instrument;

/// Number of looks at the status bar before giving up
pub const STATUS_BAR_ATTEMPTS: u32 = 10;

/// First status bar item whose title contains `title`, right now
pub async fn find_status_bar_item<I: IdeDriver>(ide: &I, title: &str) -> Result<Option<StatusBarItem>> {
    Ok(ide
        .status_bar_items()
        .await?
        .into_iter()
        .find(|item| item.title.contains(title)))
}

/// First status bar item whose title contains `title`, retried for ~10 seconds
#[instrument(skip(ide))]
pub async fn get_status_bar_item_which_includes<I: IdeDriver>(
    ide: &I,
    title: &str,
) -> Result<Option<StatusBarItem>> {
    let outcome = poll_attempts(STATUS_BAR_ATTEMPTS, DEFAULT_POLL_INTERVAL, || {
        find_status_bar_item(ide, title)
    })
    .await?;
    Ok(outcome.found())
}
