//! Error handling foundation for pairchat.
//!
//! Each crate defines its own error taxonomy and reports it through
//! rootcause, so callers can branch on `report.current_context()` without
//! seeing backend-specific codes. Errors shared by several crates live
//! here.

use rootcause::Report;
use std::fmt;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

/// Failure of a realtime subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscription could not be opened.
    EstablishFailed { message: String },
    /// An open subscription stopped delivering.
    Dropped { message: String },
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EstablishFailed { message } => {
                write!(f, "failed to establish subscription: {message}")
            }
            Self::Dropped { message } => write!(f, "subscription dropped: {message}"),
        }
    }
}

impl std::error::Error for SubscriptionError {}
