//! Request boundary middleware and extractors.
//!
//! - [`tenant::tenant_boundary`] -- verifies the Bearer credential and scopes a
//!   [`inmo_core::tenant::TenantContext`] to the request.
//! - [`tenant::Tenant`] -- reads the identity the boundary established.

pub mod tenant;
