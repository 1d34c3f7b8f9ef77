//! Identity session for pairchat.
//!
//! This crate provides:
//! - The [`User`] record shared with the contact directory
//! - The [`AuthError`] taxonomy and its mapping from provider codes
//! - [`IdentitySession`], which signs users in and out, keeps their
//!   directory record current and relays identity changes to one listener

pub mod error;
pub mod session;
pub mod user;

pub use error::AuthError;
pub use session::{IdentityListener, IdentitySession};
pub use user::{USERS_COLLECTION, User, upsert_user_record};
