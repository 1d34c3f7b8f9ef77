//! Chat session facade for pairchat.
//!
//! [`ChatClient`] wires the identity session, contact directory, selection
//! state and conversation store into one session with an explicit
//! lifecycle: the contact feed starts at sign-in, the conversation
//! follows the selection, and everything is released at sign-out.

pub mod client;
pub mod config;
pub mod error;

pub use client::ChatClient;
pub use config::{ClientConfig, ContactsConfig, IdentityConfig};
pub use error::ClientError;
