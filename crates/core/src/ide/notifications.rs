//! Waiting on transient notifications

use super::IdeDriver;
use crate::errors::{PollError, Result};
use crate::polling::{poll_until, PollOutcome, DEFAULT_POLL_INTERVAL};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// How a notification message is compared with the expected text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMatch {
    /// The whole message equals the expected text
    Exact,
    /// The message starts with the expected text
    Prefix,
}

impl NotificationMatch {
    /// Whether `message` satisfies this match against `expected`
    pub fn matches(self, message: &str, expected: &str) -> bool {
        match self {
            Self::Exact => message == expected,
            Self::Prefix => message.starts_with(expected),
        }
    }
}

async fn find_notification<I: IdeDriver>(
    ide: &I,
    expected: &str,
    matching: NotificationMatch,
) -> Result<Option<String>> {
    Ok(ide
        .notifications()
        .await?
        .into_iter()
        .find(|message| matching.matches(message, expected)))
}

/// Whether a notification matching `message` is currently displayed
pub async fn notification_is_present<I: IdeDriver>(
    ide: &I,
    message: &str,
    matching: NotificationMatch,
) -> Result<bool> {
    Ok(find_notification(ide, message, matching).await?.is_some())
}

/// Poll until a matching notification appears; false if it never does within `timeout`
#[instrument(skip(ide))]
pub async fn notification_is_present_with_timeout<I: IdeDriver>(
    ide: &I,
    message: &str,
    matching: NotificationMatch,
    timeout: Duration,
) -> Result<bool> {
    let outcome = poll_until(DEFAULT_POLL_INTERVAL, timeout, || {
        find_notification(ide, message, matching)
    })
    .await?;

    match outcome {
        PollOutcome::Found(found) => {
            debug!("Notification present: {}", found);
            Ok(true)
        }
        PollOutcome::TimedOut { elapsed, .. } => {
            info!("Notification '{}' not seen after {:?}", message, elapsed);
            Ok(false)
        }
    }
}

/// Poll until no matching notification is displayed; false if one remains after `timeout`
#[instrument(skip(ide))]
pub async fn notification_is_absent_with_timeout<I: IdeDriver>(
    ide: &I,
    message: &str,
    matching: NotificationMatch,
    timeout: Duration,
) -> Result<bool> {
    let outcome = poll_until(DEFAULT_POLL_INTERVAL, timeout, || async {
        let present = find_notification(ide, message, matching).await?.is_some();
        Ok((!present).then_some(()))
    })
    .await?;
    Ok(outcome.is_found())
}

/// Block until a notification (typically an "in progress" one) goes away
///
/// Unlike the boolean helpers this is an error when it times out, since a
/// stuck progress notification leaves the IDE unusable for later steps.
pub async fn wait_for_notification_to_go_away<I: IdeDriver>(
    ide: &I,
    message: &str,
    matching: NotificationMatch,
    timeout: Duration,
) -> Result<()> {
    if notification_is_absent_with_timeout(ide, message, matching, timeout).await? {
        Ok(())
    } else {
        Err(PollError::TimedOut {
            what: format!("notification '{}' to go away", message),
            elapsed: timeout,
        }
        .into())
    }
}

/// Dismiss a notification if it is displayed
pub async fn dismiss_notification<I: IdeDriver>(ide: &I, message: &str) -> Result<bool> {
    let dismissed = ide.dismiss_notification(message).await?;
    debug!(dismissed, "Dismiss notification '{}'", message);
    Ok(dismissed)
}
