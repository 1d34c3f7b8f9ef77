//! Error types for the identity crate.
//!
//! Provider error codes are translated here, once. Nothing above this
//! crate should ever see an `auth/...` code.

use pairchat_backend::ServiceError;
use std::fmt;

/// Errors from sign-in, sign-up and sign-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Wrong email/password combination or unknown account.
    InvalidCredentials,
    /// The email address is malformed.
    InvalidEmail,
    /// Too many attempts; the provider is throttling this account.
    RateLimited,
    /// Any other provider failure.
    Unknown { message: String },
}

impl AuthError {
    /// Maps a provider error onto the taxonomy.
    #[must_use]
    pub fn from_service(err: &ServiceError) -> Self {
        match err.code.as_str() {
            "auth/invalid-credential" | "auth/wrong-password" | "auth/user-not-found" => {
                Self::InvalidCredentials
            }
            "auth/invalid-email" => Self::InvalidEmail,
            "auth/too-many-requests" => Self::RateLimited,
            _ => Self::Unknown {
                message: err.message.clone(),
            },
        }
    }
}

impl From<ServiceError> for AuthError {
    fn from(err: ServiceError) -> Self {
        Self::from_service(&err)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "Invalid email or password"),
            Self::InvalidEmail => write!(f, "Invalid email address"),
            Self::RateLimited => write!(f, "Too many attempts. Try again later"),
            Self::Unknown { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for AuthError {}
