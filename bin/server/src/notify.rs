//! Direct-message notifier for failed runs.

use crate::config::NotifierConfig;
use async_trait::async_trait;
use flowrun_workflow::{LogNotifier, NotifyError, Notifier};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Sends notifications through the platform's `chat.postMessage` call,
/// addressed to the user id so they arrive as a direct message.
pub struct SlackNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl SlackNotifier {
    /// Creates a notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_base: impl Into<String>, bot_token: impl Into<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            bot_token: bot_token.into(),
        })
    }

    fn url(&self) -> String {
        format!("{}/chat.postMessage", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify_user(&self, user_id: &str, text: &str) -> Result<(), Report<NotifyError>> {
        let failed = |reason: String| NotifyError::DeliveryFailed {
            user_id: user_id.to_string(),
            reason,
        };

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.bot_token)
            .json(&PostMessage {
                channel: user_id,
                text,
            })
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())).into());
        }
        let body: ApiResponse = response.json().await.map_err(|e| failed(e.to_string()))?;
        if !body.ok {
            return Err(failed(body.error.unwrap_or_else(|| "unknown error".to_string())).into());
        }
        tracing::debug!(user_id, "sent failure notification");
        Ok(())
    }
}

/// Builds the notifier named by configuration.
///
/// Falls back to logging when no bot token is configured or the client
/// cannot be built.
pub fn from_config(config: &NotifierConfig) -> Arc<dyn Notifier> {
    let Some(token) = config.bot_token.as_deref().filter(|t| !t.is_empty()) else {
        tracing::info!("no bot token configured, failure notifications will only be logged");
        return Arc::new(LogNotifier);
    };
    match SlackNotifier::new(&config.api_base, token) {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            tracing::warn!(error = %e, "failed to build notifier, falling back to logging");
            Arc::new(LogNotifier)
        }
    }
}
