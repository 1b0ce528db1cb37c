//! Well-known delivery channel name constants.
//!
//! These match the values stored in the `notifications.notification_type`
//! column and the channel keys used by the sender router.

/// Email delivered through the configured mail transport.
pub const CHANNEL_EMAIL: &str = "EMAIL";

/// WhatsApp message; the alternate channel toggled by notification policies.
pub const CHANNEL_WHATSAPP: &str = "WHATSAPP";

/// Plain SMS text message.
pub const CHANNEL_SMS: &str = "SMS";

/// All valid channel names.
pub const VALID_CHANNELS: &[&str] = &[CHANNEL_EMAIL, CHANNEL_WHATSAPP, CHANNEL_SMS];
