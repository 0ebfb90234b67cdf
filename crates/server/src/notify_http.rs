use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use alur_core::config::NotifierConfig;
use alur_core::notify::{NotificationDispatch, TransitionNotice};

/// Fire-and-forget webhook delivery of transition notices. Delivery failures
/// are logged and dropped; the committed transition stands either way.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    auth_token: Option<SecretString>,
}

impl WebhookNotifier {
    pub fn from_config(config: &NotifierConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let webhook_url = config.webhook_url.clone()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .ok()?;

        Some(Self { client, webhook_url, auth_token: config.auth_token.clone() })
    }
}

impl NotificationDispatch for WebhookNotifier {
    fn dispatch(&self, notice: TransitionNotice) {
        let mut request = self.client.post(&self.webhook_url).json(&notice);
        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let request_id = notice.request_id.0.clone();
        let to = notice.to.encode();
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!(
                    event_name = "notify.webhook_rejected",
                    correlation_id = "notify",
                    request_id = %request_id,
                    to = %to,
                    status = %response.status(),
                    "transition notice rejected by webhook"
                ),
                Err(error) => warn!(
                    event_name = "notify.webhook_failed",
                    correlation_id = "notify",
                    request_id = %request_id,
                    to = %to,
                    error = %error,
                    "transition notice delivery failed"
                ),
            }
        });
    }
}
