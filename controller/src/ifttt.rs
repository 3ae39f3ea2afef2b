use async_trait::async_trait;
use tracing::debug;

use heater_common::{HeaterAction, IftttConfig};

use crate::{control::HeaterSwitch, error::ControlError};

pub const IFTTT_BASE_URL: &str = "https://maker.ifttt.com";

/// Switches the heater through IFTTT Maker webhooks. A 2xx only means the
/// event was accepted, not that the heater responded.
pub struct IftttWebhook {
    http: reqwest::Client,
    base_url: String,
    on_event: String,
    off_event: String,
    webhook_key: String,
}

impl IftttWebhook {
    pub fn new(http: reqwest::Client, config: &IftttConfig) -> Self {
        Self::with_base_url(http, config, IFTTT_BASE_URL)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        config: &IftttConfig,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            on_event: config.on_event.clone(),
            off_event: config.off_event.clone(),
            webhook_key: config.webhook_key.clone(),
        }
    }

    fn event(&self, action: HeaterAction) -> &str {
        match action {
            HeaterAction::TurnOn => &self.on_event,
            HeaterAction::TurnOff => &self.off_event,
        }
    }

    fn trigger_url(&self, action: HeaterAction) -> String {
        format!(
            "{}/trigger/{}/with/key/{}",
            self.base_url,
            self.event(action),
            self.webhook_key
        )
    }
}

#[async_trait]
impl HeaterSwitch for IftttWebhook {
    async fn switch(&self, action: HeaterAction) -> Result<(), ControlError> {
        // URL carries the webhook key, keep it out of the logs.
        debug!(event = self.event(action), "triggering ifttt event");

        self.http
            .get(self.trigger_url(action))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map(|_| ())
            .map_err(|err| ControlError::Actuation {
                action: action.as_str(),
                source: err.without_url().into(),
            })
    }
}
