//! Reading the output panel

use super::IdeDriver;
use crate::errors::Result;
use crate::polling::{poll_attempts, DEFAULT_POLL_INTERVAL};
use tracing::{debug, info, instrument};

/// Command palette label that clears the selected output channel
pub const CLEAR_OUTPUT_COMMAND: &str = "View: Clear Output";

/// Select `channel` and return its full text
pub async fn get_output_view_text<I: IdeDriver>(ide: &I, channel: &str) -> Result<String> {
    ide.select_output_channel(channel).await?;
    ide.output_panel_text().await
}

/// Clear the currently selected output channel
pub async fn clear_output_view<I: IdeDriver>(ide: &I) -> Result<()> {
    ide.execute_command(CLEAR_OUTPUT_COMMAND).await
}

/// Look for `expected` in `channel`, up to `attempts` samples one second apart
///
/// Returns the channel text in which `expected` was found.
#[instrument(skip(ide))]
pub async fn attempt_to_find_output_panel_text<I: IdeDriver>(
    ide: &I,
    channel: &str,
    expected: &str,
    attempts: u32,
) -> Result<Option<String>> {
    let outcome = poll_attempts(attempts, DEFAULT_POLL_INTERVAL, || async {
        let text = get_output_view_text(ide, channel).await?;
        Ok(text.contains(expected).then_some(text))
    })
    .await?;

    let found = outcome.found();
    if found.is_some() {
        debug!("Found '{}' in output channel {}", expected, channel);
    } else {
        info!(
            "'{}' not found in output channel {} after {} attempts",
            expected, channel, attempts
        );
    }
    Ok(found)
}

/// Whether every string in `expected` appears in `channel`'s text
pub async fn output_panel_contains_all<I: IdeDriver>(
    ide: &I,
    channel: &str,
    expected: &[&str],
) -> Result<bool> {
    let text = get_output_view_text(ide, channel).await?;
    let missing: Vec<&&str> = expected.iter().filter(|e| !text.contains(**e)).collect();
    if !missing.is_empty() {
        debug!("Output channel {} is missing {:?}", channel, missing);
    }
    Ok(missing.is_empty())
}
