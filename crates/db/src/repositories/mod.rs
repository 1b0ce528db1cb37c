//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod notification_policy_repo;
pub mod notification_repo;

pub use notification_policy_repo::NotificationPolicyRepo;
pub use notification_repo::NotificationRepo;
