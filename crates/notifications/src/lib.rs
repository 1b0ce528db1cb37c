//! Notification scheduling, deduplication, and delivery.
//!
//! - [`store`] -- persistence seams with PostgreSQL and in-memory backends.
//! - [`policy`] -- per-tenant policy resolution with built-in defaults.
//! - [`sender`] -- the outbound transport seam and per-channel routing.
//! - [`engine`] -- the notification state machine and guarded dispatch.
//! - [`sweep`] -- the periodic background task that finds and attempts due work.
//! - [`reminders`] -- turns business reminder candidates into notifications.

pub mod engine;
pub mod error;
pub mod policy;
pub mod reminders;
pub mod sender;
pub mod store;
pub mod sweep;

pub use engine::{
    Delivery, DispatchConfig, DispatchOutcome, NotificationEngine, NotificationSummary,
};
pub use error::EngineError;
pub use policy::PolicyResolver;
pub use reminders::{PlanReport, ReminderCandidate, ReminderPlanner, ReminderSource};
pub use sender::{ChannelSenders, LogSender, OutboundMessage, SendError, Sender};
pub use store::{
    MemoryNotificationStore, MemoryPolicyStore, NotificationStore, PgNotificationStore,
    PgPolicyStore, PolicyStore,
};
pub use sweep::{NotificationSweeper, SweepConfig, SweepReport};
