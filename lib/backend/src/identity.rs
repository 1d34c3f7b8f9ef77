//! Identity service contract.

use crate::error::ServiceError;
use async_trait::async_trait;
use pairchat_core::UserId;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The identity the provider reports for a signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable account id.
    pub uid: UserId,
    /// Account email.
    pub email: String,
    /// Profile display name, if one was set.
    pub display_name: Option<String>,
}

/// An authentication provider.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Registers a new account and signs it in.
    async fn create_account(&self, email: &str, password: &str)
    -> Result<AuthUser, ServiceError>;

    /// Signs in an existing account.
    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthUser, ServiceError>;

    /// Signs out the current account.
    async fn sign_out(&self) -> Result<(), ServiceError>;

    /// Sets the profile display name of an account.
    async fn set_display_name(&self, user_id: &UserId, name: &str) -> Result<(), ServiceError>;

    /// Returns a receiver tracking the signed-in identity.
    ///
    /// The receiver holds the current value immediately and is notified on
    /// every sign-in, sign-out and profile change.
    fn identity_changes(&self) -> watch::Receiver<Option<AuthUser>>;
}
