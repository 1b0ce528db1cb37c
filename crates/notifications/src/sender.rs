//! Outbound delivery seam.
//!
//! The engine only knows [`Sender`]. Real transports (SMTP, WhatsApp
//! gateways, SMS providers) live outside this crate and are plugged in per
//! channel through [`ChannelSenders`]. [`LogSender`] stands in for a channel
//! whose transport is not configured: it records the message and reports
//! success.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use inmo_core::notification::NotificationType;
use inmo_core::types::DbId;
use inmo_db::models::notification::Notification;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// A failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The transport rejected or could not deliver the message.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport did not answer within the configured bound.
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    /// No transport is registered for the channel.
    #[error("No sender configured for channel {0}")]
    UnsupportedChannel(String),
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// What a transport needs to deliver one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub notification_id: DbId,
    pub tenant_id: DbId,
    pub channel: NotificationType,
    pub destination: String,
    pub subject: String,
    pub body: String,
}

impl From<&Notification> for OutboundMessage {
    fn from(n: &Notification) -> Self {
        Self {
            notification_id: n.id,
            tenant_id: n.tenant_id,
            channel: n.notification_type,
            destination: n.destination.clone(),
            subject: n.subject.clone(),
            body: n.body.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Channel transport.
///
/// Implementations may block on network I/O; the engine bounds every call
/// with a timeout, so they need not enforce one themselves.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError>;
}

/// Sender that logs the message and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

#[async_trait]
impl Sender for LogSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        tracing::info!(
            notification_id = message.notification_id,
            tenant_id = message.tenant_id,
            channel = %message.channel,
            destination = %message.destination,
            subject = %message.subject,
            "Transport not configured, simulating delivery"
        );
        Ok(())
    }
}

/// Routes each message to the sender registered for its channel.
#[derive(Clone, Default)]
pub struct ChannelSenders {
    senders: HashMap<NotificationType, Arc<dyn Sender>>,
}

impl ChannelSenders {
    /// A router with no channels registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A router that simulates delivery on every channel.
    pub fn logging() -> Self {
        let log: Arc<dyn Sender> = Arc::new(LogSender);
        Self::new()
            .with(NotificationType::Email, Arc::clone(&log))
            .with(NotificationType::Whatsapp, Arc::clone(&log))
            .with(NotificationType::Sms, log)
    }

    /// Register (or replace) the sender for `channel`.
    pub fn with(mut self, channel: NotificationType, sender: Arc<dyn Sender>) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    pub fn supports(&self, channel: NotificationType) -> bool {
        self.senders.contains_key(&channel)
    }
}

#[async_trait]
impl Sender for ChannelSenders {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        match self.senders.get(&message.channel) {
            Some(sender) => sender.send(message).await,
            None => Err(SendError::UnsupportedChannel(message.channel.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl Sender for Counting {
        async fn send(&self, _message: &OutboundMessage) -> Result<(), SendError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn message(channel: NotificationType) -> OutboundMessage {
        OutboundMessage {
            notification_id: 1,
            tenant_id: 1,
            channel,
            destination: "ana@example.com".to_string(),
            subject: "Aviso".to_string(),
            body: "Hola".to_string(),
        }
    }

    #[tokio::test]
    async fn routes_by_channel() {
        let email = Arc::new(Counting::default());
        let router = ChannelSenders::new().with(NotificationType::Email, email.clone());

        router.send(&message(NotificationType::Email)).await.unwrap();
        assert_eq!(email.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregistered_channel_is_unsupported() {
        let router = ChannelSenders::new().with(NotificationType::Email, Arc::new(LogSender));
        assert_matches!(
            router.send(&message(NotificationType::Sms)).await,
            Err(SendError::UnsupportedChannel(c)) if c == "SMS"
        );
    }

    #[test]
    fn logging_router_covers_every_channel() {
        let router = ChannelSenders::logging();
        assert!(router.supports(NotificationType::Email));
        assert!(router.supports(NotificationType::Whatsapp));
        assert!(router.supports(NotificationType::Sms));
    }
}
