//! Authentication primitives.
//!
//! - [`jwt`] -- signed credential issuing and verification.

pub mod jwt;
