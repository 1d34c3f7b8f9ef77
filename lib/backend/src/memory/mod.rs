//! In-process backend implementations.
//!
//! Both services keep all state in memory and deliver realtime updates
//! synchronously with each write. They also expose failure injection so
//! callers can exercise their error paths.

mod identity;
mod store;

pub use identity::{DEFAULT_MIN_PASSWORD_LENGTH, MemoryIdentityService};
pub use store::MemoryDocumentStore;
