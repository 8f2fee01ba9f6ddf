use super::Notifier;
use crate::domain::error::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v17.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub api_base: String,
    pub phone_number_id: String,
    pub token: String,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    text: MessageText<'a>,
}

#[derive(Serialize)]
struct MessageText<'a> {
    body: &'a str,
}

/// WhatsApp Cloud API sender
pub struct WhatsAppNotifier {
    client: reqwest::Client,
    config: WhatsAppConfig,
}

impl WhatsAppNotifier {
    pub fn new(config: WhatsAppConfig) -> Result<Self> {
        if config.token.trim().is_empty() || config.phone_number_id.trim().is_empty() {
            return Err(AppError::ConfigError(
                "WhatsApp token and phone number id are required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.phone_number_id.trim()
        )
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        let url = self.endpoint();
        debug!(to = %to, "Sending WhatsApp message");

        let payload = OutboundMessage {
            messaging_product: "whatsapp",
            to,
            text: MessageText { body },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(to = %to, error = %e, "WhatsApp request failed");
                AppError::NotificationError(format!("Failed to send WhatsApp message: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(to = %to, %status, "WhatsApp API error: {}", text);
            return Err(AppError::NotificationError(format!(
                "WhatsApp API error ({})",
                status
            )));
        }

        info!(to = %to, "Message sent");
        Ok(())
    }
}
