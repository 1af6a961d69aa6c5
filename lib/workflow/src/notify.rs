//! Human notification on failed runs.

use crate::error::NotifyError;
use async_trait::async_trait;
use rootcause::prelude::Report;
use tracing::warn;

/// Delivers a direct message to a platform user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `text` to `user_id`.
    async fn notify_user(&self, user_id: &str, text: &str) -> Result<(), Report<NotifyError>>;
}

/// Notifier that only logs. Used when no bot credential is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_user(&self, user_id: &str, text: &str) -> Result<(), Report<NotifyError>> {
        warn!(user_id, text, "no notifier configured, dropping notification");
        Ok(())
    }
}

/// Formats the message sent when a run aborts.
#[must_use]
pub fn failure_message(workflow_name: &str, error: &str) -> String {
    format!(
        "A workflow (`{workflow_name}`) finished with an error. Please review the following error information.\n\n```\n{error}\n```"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_quotes_name_and_error() {
        let text = failure_message("Greeter", "step `nope` not found");
        assert!(text.starts_with("A workflow (`Greeter`) finished with an error."));
        assert!(text.ends_with("```\nstep `nope` not found\n```"));
    }
}
