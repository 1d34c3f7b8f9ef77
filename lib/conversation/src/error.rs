//! Error types for the conversation crate.
//!
//! Store failures are translated into these types at the
//! [`ConversationStore`](crate::ConversationStore) boundary:
//! - `SendError`: errors from sending a message
//! - `EditError`: errors from editing a message
//! - `DeleteError`: errors from deleting a message
//!
//! Subscription failures use [`pairchat_core::SubscriptionError`].

use pairchat_core::MessageId;
use std::fmt;

/// Errors from sending a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The text is empty or whitespace.
    EmptyText,
    /// The store rejected or did not complete the write.
    NetworkOrBackendFailure { message: String },
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyText => write!(f, "cannot send an empty message"),
            Self::NetworkOrBackendFailure { message } => {
                write!(f, "failed to send message: {message}")
            }
        }
    }
}

impl std::error::Error for SendError {}

/// Errors from editing a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// The replacement text is empty or whitespace.
    EmptyText,
    /// No such message.
    NotFound { message_id: MessageId },
    /// The message was sent by someone else.
    NotOwner { message_id: MessageId },
    /// The store rejected or did not complete the write.
    NetworkOrBackendFailure { message: String },
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyText => write!(f, "message text cannot be empty"),
            Self::NotFound { message_id } => write!(f, "message not found: {message_id}"),
            Self::NotOwner { message_id } => {
                write!(f, "only the sender can edit message {message_id}")
            }
            Self::NetworkOrBackendFailure { message } => {
                write!(f, "failed to edit message: {message}")
            }
        }
    }
}

impl std::error::Error for EditError {}

/// Errors from deleting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteError {
    /// No such message.
    NotFound { message_id: MessageId },
    /// The message was sent by someone else.
    NotOwner { message_id: MessageId },
    /// The store rejected or did not complete the write.
    NetworkOrBackendFailure { message: String },
}

impl fmt::Display for DeleteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { message_id } => write!(f, "message not found: {message_id}"),
            Self::NotOwner { message_id } => {
                write!(f, "only the sender can delete message {message_id}")
            }
            Self::NetworkOrBackendFailure { message } => {
                write!(f, "failed to delete message: {message}")
            }
        }
    }
}

impl std::error::Error for DeleteError {}
