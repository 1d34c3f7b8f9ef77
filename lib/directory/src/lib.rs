//! Contact directory for pairchat.
//!
//! The directory lists every registered user except the signed-in one.
//! It can be read once ([`ContactDirectory::refresh`]) or followed live
//! ([`ContactDirectory::subscribe`]), and it can seed a fixed set of
//! placeholder contacts for demos.

pub mod directory;
pub mod error;
pub mod feed;
pub mod samples;

pub use directory::ContactDirectory;
pub use error::DirectoryError;
pub use feed::{ContactFeed, ContactList};
pub use samples::sample_contacts;
