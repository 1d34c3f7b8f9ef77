//! Core types shared by every pairchat crate.
//!
//! This crate provides the opaque identifier types used for users and
//! messages, the `Result` alias used for layered error reporting, and
//! errors shared across components.

pub mod error;
pub mod id;

pub use error::{Result, SubscriptionError};
pub use id::{MessageId, ParseIdError, UserId};
