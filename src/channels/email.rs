//! Email channel — SMTP via lettre, with a mock fallback when
//! credentials are absent.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::channels::{NotificationChannel, OutboundMessage, SendOutcome};
use crate::error::ChannelError;

// ── Configuration ───────────────────────────────────────────────────

/// SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_USER` is not set — the channel then
    /// records mock sends instead of erroring.
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("SMTP_USER").ok()?;
        let password = std::env::var("SMTP_PASS").unwrap_or_default();

        let host = std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string());
        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);
        let from_address = std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

// ── Channel ─────────────────────────────────────────────────────────

/// Outbound email via SMTP relay.
pub struct EmailChannel {
    config: Option<SmtpConfig>,
}

impl EmailChannel {
    pub fn new(config: Option<SmtpConfig>) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(SmtpConfig::from_env())
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(
        &self,
        recipient: &str,
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ChannelError> {
        let Some(config) = self.config.clone() else {
            info!(
                to = %recipient,
                subject = %message.subject,
                "SMTP credentials missing, recording mock email send"
            );
            return Ok(SendOutcome::Mocked);
        };

        let email = build_message(&config, recipient, message)?;

        // lettre's SMTP transport is blocking.
        tokio::task::spawn_blocking(move || {
            let transport = SmtpTransport::relay(&config.host)
                .map_err(|e| ChannelError::SendFailed {
                    name: "email".into(),
                    reason: format!("SMTP relay error: {e}"),
                })?
                .port(config.port)
                .credentials(Credentials::new(config.username, config.password))
                .build();

            transport
                .send(&email)
                .map_err(|e| ChannelError::SendFailed {
                    name: "email".into(),
                    reason: format!("SMTP send failed: {e}"),
                })
        })
        .await
        .map_err(|e| ChannelError::SendFailed {
            name: "email".into(),
            reason: format!("send task failed: {e}"),
        })??;

        info!(to = %recipient, subject = %message.subject, "Email sent");
        Ok(SendOutcome::Delivered {
            provider_message_id: None,
        })
    }
}

/// Build the lettre message: multipart text+html when an HTML body is
/// provided, plain text otherwise.
fn build_message(
    config: &SmtpConfig,
    recipient: &str,
    message: &OutboundMessage,
) -> Result<Message, ChannelError> {
    let from: Mailbox = config
        .from_address
        .parse()
        .map_err(|e| ChannelError::SendFailed {
            name: "email".into(),
            reason: format!("Invalid from address: {e}"),
        })?;
    let to: Mailbox = recipient.parse().map_err(|e| ChannelError::SendFailed {
        name: "email".into(),
        reason: format!("Invalid recipient address: {e}"),
    })?;

    let builder = Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.as_str());

    match &message.html {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            message.text.clone(),
            html.clone(),
        )),
        None => builder.body(message.text.clone()),
    }
    .map_err(|e| ChannelError::SendFailed {
        name: "email".into(),
        reason: format!("Failed to build email: {e}"),
    })
}
