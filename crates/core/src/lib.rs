//! Domain building blocks shared by every inmo crate.
//!
//! This crate performs no I/O. It holds identifiers, the error taxonomy, the
//! notification state machine, policy validation, and the request-scoped
//! [`tenant::TenantContext`].

pub mod channels;
pub mod error;
pub mod notification;
pub mod policy;
pub mod roles;
pub mod template;
pub mod tenant;
pub mod types;
