//! Webhook notification of run summaries

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts `{"content": message}` to a webhook
pub struct Notifier {
    client: reqwest::Client,
    url: String,
}

impl Notifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .context("Failed to build webhook HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Send `message`
    pub async fn send(&self, message: &str) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&serde_json::json!({ "content": message }))
            .send()
            .await
            .context("Webhook request failed")?
            .error_for_status()
            .context("Webhook rejected the notification")?;

        debug!("Webhook notification sent");
        Ok(())
    }
}

/// Send `message` to `url` if one is configured
///
/// Failures are logged and swallowed; a run never fails because of its
/// notification.
pub async fn notify(url: Option<&str>, message: &str) {
    let Some(url) = url else {
        return;
    };

    let result = match Notifier::new(url) {
        Ok(notifier) => notifier.send(message).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        warn!("Could not send webhook notification: {:#}", e);
    }
}
