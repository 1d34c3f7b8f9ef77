//! Error types for the directory crate.

use pairchat_core::SubscriptionError;
use std::fmt;

/// Errors from directory operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The backing store failed a read or write.
    NetworkOrBackendFailure { message: String },
    /// The directory subscription failed.
    Subscription(SubscriptionError),
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkOrBackendFailure { message } => {
                write!(f, "directory backend failure: {message}")
            }
            Self::Subscription(inner) => write!(f, "directory {inner}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

impl From<SubscriptionError> for DirectoryError {
    fn from(err: SubscriptionError) -> Self {
        Self::Subscription(err)
    }
}
