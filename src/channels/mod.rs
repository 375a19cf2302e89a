//! Notification channels — outbound-only senders for reminders and
//! digests.
//!
//! Channels are pure senders: rendering and recipient selection happen
//! in the dispatcher. A channel with missing credentials records a
//! mock outcome instead of erroring, so the pipeline stays exercisable
//! without live accounts.

pub mod email;
pub mod whatsapp;

use async_trait::async_trait;

use crate::error::ChannelError;

pub use email::{EmailChannel, SmtpConfig};
pub use whatsapp::{WhatsAppChannel, WhatsAppConfig};

/// A rendered outbound notification.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub subject: String,
    /// Plain-text body, used by every channel.
    pub text: String,
    /// HTML alternative, used by channels that support it.
    pub html: Option<String>,
}

/// How a send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the provider.
    Delivered {
        provider_message_id: Option<String>,
    },
    /// Credentials missing — recorded, not sent.
    Mocked,
}

/// Outbound send primitive.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name (e.g. "email", "whatsapp").
    fn name(&self) -> &str;

    /// Send one message to one recipient.
    async fn send(
        &self,
        recipient: &str,
        message: &OutboundMessage,
    ) -> Result<SendOutcome, ChannelError>;
}
