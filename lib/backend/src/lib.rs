//! External collaborators of the pairchat client.
//!
//! The client never talks to a concrete cloud SDK. It consumes two
//! services through the traits in this crate:
//!
//! - **Identity service** ([`IdentityService`]): account creation,
//!   authentication, sign-out and a change-notification stream.
//! - **Document store** ([`DocumentStore`]): keyed documents grouped into
//!   collections, with realtime query subscriptions that deliver full
//!   result snapshots.
//!
//! [`memory`] contains in-process implementations of both, used by tests
//! and by the terminal client.

pub mod document;
pub mod error;
pub mod identity;
pub mod memory;
pub mod query;
pub mod store;
pub mod subscription;

pub use document::{Document, Fields, SERVER_TIMESTAMP};
pub use error::{ServiceError, StoreError};
pub use identity::{AuthUser, IdentityService};
pub use memory::{MemoryDocumentStore, MemoryIdentityService};
pub use query::{Filter, OrderBy, Query};
pub use store::DocumentStore;
pub use subscription::{Snapshot, Subscription, SubscriptionHandle};
