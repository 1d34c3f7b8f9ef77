//! Conversations for pairchat.
//!
//! This crate provides:
//!
//! - **Selection State**: which contact is the active conversation partner
//! - **Conversation Store**: the ordered, live message history of the
//!   selected pair, plus send, edit and delete
//!
//! The store keeps at most one realtime subscription open. Every snapshot
//! it receives replaces the visible history wholesale; sends, edits and
//! deletes only become visible through the next snapshot.

pub mod error;
pub mod message;
pub mod selection;
pub mod store;

pub use error::{DeleteError, EditError, SendError};
pub use message::{ConversationKey, MESSAGES_COLLECTION, Message, sort_messages};
pub use selection::SelectionState;
pub use store::{ConversationState, ConversationStore, ConversationView};
