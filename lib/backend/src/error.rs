//! Raw errors reported by the backend collaborators.
//!
//! These carry backend-specific identifiers. Components translate them
//! into their own taxonomy at the boundary and never expose them upward.

use std::fmt;

/// Error reported by the identity service.
///
/// `code` is the provider's machine-readable identifier, such as
/// `auth/invalid-email`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// Provider error code.
    pub code: String,
    /// Human-readable message from the provider.
    pub message: String,
}

impl ServiceError {
    /// Creates a new service error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "identity service error ({}): {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

/// Errors from document store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or refused the request.
    Unavailable { message: String },
    /// The addressed document does not exist.
    NotFound { collection: String, id: String },
    /// A realtime subscription stream ended abnormally.
    StreamClosed { message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { message } => write!(f, "document store unavailable: {message}"),
            Self::NotFound { collection, id } => {
                write!(f, "document not found: {collection}/{id}")
            }
            Self::StreamClosed { message } => {
                write!(f, "subscription stream closed: {message}")
            }
        }
    }
}

impl std::error::Error for StoreError {}
