//! Row models.

pub mod notification;
pub mod notification_policy;
