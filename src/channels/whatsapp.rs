//! WhatsApp channel — Meta Graph API text messages, with a mock
//! fallback when credentials are absent.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::channels::{NotificationChannel, OutboundMessage, SendOutcome};
use crate::error::ChannelError;

// ── Configuration ───────────────────────────────────────────────────

/// WhatsApp Business API credentials, built from environment variables.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub access_token: String,
    pub phone_id: String,
}

impl WhatsAppConfig {
    /// Build config from environment variables.
    /// Returns `None` unless both `WHATSAPP_ACCESS_TOKEN` and
    /// `WHATSAPP_PHONE_ID` are set — the channel then records mock
    /// sends instead of erroring.
    pub fn from_env() -> Option<Self> {
        let access_token = std::env::var("WHATSAPP_ACCESS_TOKEN").ok()?;
        let phone_id = std::env::var("WHATSAPP_PHONE_ID").ok()?;
        Some(Self {
            access_token,
            phone_id,
        })
    }
}

// ── Channel ─────────────────────────────────────────────────────────

/// Outbound WhatsApp text messages via the Graph API.
pub struct WhatsAppChannel {
    config: Option<WhatsAppConfig>,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(config: Option<WhatsAppConfig>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(WhatsAppConfig::from_env())
    }

    fn api_url(phone_id: &str) -> String {
        format!("https://graph.facebook.com/v17.0/{phone_id}/messages")
    }

    /// POST a text message, returning the provider message id when the
    /// API reports one.
    async fn post_text(
        &self,
        config: &WhatsAppConfig,
        to: &str,
        text: &str,
    ) -> anyhow::Result<Option<String>> {
        let body = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": text },
        });

        let response = self
            .client
            .post(Self::api_url(&config.phone_id))
            .bearer_auth(&config.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("WhatsApp send failed ({status}): {detail}");
        }

        let data: serde_json::Value = response.json().await?;
        let message_id = data["messages"][0]["id"].as_str().map(String::from);
        Ok(message_id)
    }
}

#[async_trait]
impl NotificationChannel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send(
        &self,
        recipient: &str,
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ChannelError> {
        let Some(config) = &self.config else {
            info!(
                to = %recipient,
                subject = %message.subject,
                "WhatsApp credentials missing, recording mock send"
            );
            return Ok(SendOutcome::Mocked);
        };

        // WhatsApp has no subject line, fold it into the chat body.
        let text = format!("{}\n\n{}", message.subject, message.text);

        let provider_message_id = self
            .post_text(config, recipient, &text)
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: e.to_string(),
            })?;

        info!(to = %recipient, message_id = ?provider_message_id, "WhatsApp message sent");
        Ok(SendOutcome::Delivered {
            provider_message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_embeds_phone_id() {
        assert_eq!(
            WhatsAppChannel::api_url("12345"),
            "https://graph.facebook.com/v17.0/12345/messages"
        );
    }

    #[tokio::test]
    async fn missing_credentials_record_mock_send() {
        let channel = WhatsAppChannel::new(None);
        let outcome = channel
            .send(
                "15551234567",
                &OutboundMessage {
                    subject: "Reminder".into(),
                    text: "Please share the minutes".into(),
                    html: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Mocked);
    }
}
