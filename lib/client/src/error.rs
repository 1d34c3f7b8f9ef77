//! Error types for the client crate.

use pairchat_conversation::{DeleteError, EditError, SendError};
use pairchat_core::SubscriptionError;
use pairchat_directory::DirectoryError;
use pairchat_identity::AuthError;
use rootcause::prelude::Report;
use std::fmt;

/// Errors from [`ChatClient`](crate::ChatClient) operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The operation needs a signed-in user.
    NotSignedIn,
    /// The operation needs a selected contact.
    NoSelection,
    /// Sign-in, sign-up or sign-out failed.
    Auth(AuthError),
    /// The contact directory failed.
    Directory(DirectoryError),
    /// The conversation subscription failed.
    Subscription(SubscriptionError),
    /// Sending failed.
    Send(SendError),
    /// Editing failed.
    Edit(EditError),
    /// Deleting failed.
    Delete(DeleteError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSignedIn => write!(f, "not signed in"),
            Self::NoSelection => write!(f, "no contact selected"),
            Self::Auth(inner) => write!(f, "{inner}"),
            Self::Directory(inner) => write!(f, "{inner}"),
            Self::Subscription(inner) => write!(f, "conversation {inner}"),
            Self::Send(inner) => write!(f, "{inner}"),
            Self::Edit(inner) => write!(f, "{inner}"),
            Self::Delete(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for ClientError {}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for ClientError {
                fn from(err: $source) -> Self {
                    Self::$variant(err)
                }
            }
        )*
    };
}

impl_from! {
    AuthError => Auth,
    DirectoryError => Directory,
    SubscriptionError => Subscription,
    SendError => Send,
    EditError => Edit,
    DeleteError => Delete,
}

/// Wraps a component report in the matching client error, keeping the
/// component report as its child.
pub(crate) fn lift<C>(report: Report<C>) -> Report<ClientError>
where
    C: Clone + Into<ClientError>,
{
    let context = report.current_context().clone().into();
    report.context(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_message() {
        let err = ClientError::from(AuthError::InvalidCredentials);
        assert_eq!(err.to_string(), "Invalid email or password");
        assert_eq!(ClientError::NoSelection.to_string(), "no contact selected");
    }

    #[test]
    fn lifted_report_keeps_component_report() {
        let component: Report<SendError> = SendError::EmptyText.into();

        let lifted = lift(component);

        assert_eq!(lifted.current_context(), &ClientError::Send(SendError::EmptyText));
        assert_eq!(lifted.children().len(), 1);
    }
}
