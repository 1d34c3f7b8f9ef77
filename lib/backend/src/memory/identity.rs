use crate::error::ServiceError;
use crate::identity::{AuthUser, IdentityService};
use async_trait::async_trait;
use pairchat_core::UserId;
use std::collections::HashMap;
use tokio::sync::{Mutex, watch};
use tracing::debug;

/// Consecutive failed sign-ins after which an email is throttled.
const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Default minimum password length accepted at registration.
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 6;

struct Account {
    uid: UserId,
    email: String,
    password: String,
    display_name: Option<String>,
}

impl Account {
    fn auth_user(&self) -> AuthUser {
        AuthUser {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    failed_attempts: HashMap<String, u32>,
}

/// An in-memory [`IdentityService`] holding one signed-in account at a time.
///
/// Error codes follow the common `auth/...` provider convention so callers
/// exercise their code mapping against realistic values.
pub struct MemoryIdentityService {
    state: Mutex<State>,
    current: watch::Sender<Option<AuthUser>>,
    min_password_length: usize,
}

impl Default for MemoryIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityService {
    /// Creates a service with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::with_min_password_length(DEFAULT_MIN_PASSWORD_LENGTH)
    }

    /// Creates a service enforcing a custom minimum password length.
    #[must_use]
    pub fn with_min_password_length(min_password_length: usize) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            state: Mutex::new(State::default()),
            current,
            min_password_length,
        }
    }

    /// Returns the currently signed-in account, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.current.borrow().clone()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[async_trait]
impl IdentityService for MemoryIdentityService {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, ServiceError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(ServiceError::new(
                "auth/invalid-email",
                "The email address is badly formatted.",
            ));
        }
        if password.chars().count() < self.min_password_length {
            return Err(ServiceError::new(
                "auth/weak-password",
                format!(
                    "Password should be at least {} characters.",
                    self.min_password_length
                ),
            ));
        }

        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&email) {
            return Err(ServiceError::new(
                "auth/email-already-in-use",
                "The email address is already in use by another account.",
            ));
        }

        let account = Account {
            uid: UserId::generate(),
            email: email.clone(),
            password: password.to_string(),
            display_name: None,
        };
        let user = account.auth_user();
        state.accounts.insert(email, account);
        self.current.send_replace(Some(user.clone()));
        debug!(user_id = %user.uid, "account created");
        Ok(user)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthUser, ServiceError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(ServiceError::new(
                "auth/invalid-email",
                "The email address is badly formatted.",
            ));
        }

        let mut state = self.state.lock().await;
        let failures = state.failed_attempts.get(&email).copied().unwrap_or(0);
        if failures >= MAX_FAILED_ATTEMPTS {
            return Err(ServiceError::new(
                "auth/too-many-requests",
                "Access to this account has been temporarily disabled due to many failed login attempts.",
            ));
        }

        let user = state
            .accounts
            .get(&email)
            .filter(|account| account.password == password)
            .map(Account::auth_user);

        match user {
            Some(user) => {
                state.failed_attempts.remove(&email);
                self.current.send_replace(Some(user.clone()));
                debug!(user_id = %user.uid, "signed in");
                Ok(user)
            }
            None => {
                *state.failed_attempts.entry(email).or_insert(0) += 1;
                Err(ServiceError::new(
                    "auth/invalid-credential",
                    "The supplied auth credential is incorrect.",
                ))
            }
        }
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        self.current.send_replace(None);
        Ok(())
    }

    async fn set_display_name(&self, user_id: &UserId, name: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .values_mut()
            .find(|account| &account.uid == user_id)
            .ok_or_else(|| {
                ServiceError::new("auth/user-not-found", "There is no user record for this id.")
            })?;
        account.display_name = Some(name.to_string());
        let updated = account.auth_user();

        // Profile changes on the signed-in account are announced to listeners.
        self.current.send_if_modified(|current| match current {
            Some(user) if user.uid == updated.uid => {
                *user = updated;
                true
            }
            _ => false,
        });
        Ok(())
    }

    fn identity_changes(&self) -> watch::Receiver<Option<AuthUser>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_account_signs_in() {
        let service = MemoryIdentityService::new();
        let changes = service.identity_changes();

        let user = service
            .create_account("Alice@Example.com", "secret1")
            .await
            .unwrap();

        assert_eq!(user.email, "alice@example.com");
        assert_eq!(changes.borrow().as_ref(), Some(&user));
    }

    #[tokio::test]
    async fn create_account_validates_input() {
        let service = MemoryIdentityService::new();

        let err = service.create_account("not-an-email", "secret1").await.unwrap_err();
        assert_eq!(err.code, "auth/invalid-email");

        let err = service.create_account("a@x.io", "123").await.unwrap_err();
        assert_eq!(err.code, "auth/weak-password");

        service.create_account("a@x.io", "secret1").await.unwrap();
        let err = service.create_account("a@x.io", "secret1").await.unwrap_err();
        assert_eq!(err.code, "auth/email-already-in-use");
    }

    #[tokio::test]
    async fn repeated_failures_are_throttled() {
        let service = MemoryIdentityService::new();
        service.create_account("a@x.io", "secret1").await.unwrap();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let err = service.authenticate("a@x.io", "wrong").await.unwrap_err();
            assert_eq!(err.code, "auth/invalid-credential");
        }

        let err = service.authenticate("a@x.io", "secret1").await.unwrap_err();
        assert_eq!(err.code, "auth/too-many-requests");
    }

    #[tokio::test]
    async fn display_name_change_is_published() {
        let service = MemoryIdentityService::new();
        let user = service.create_account("a@x.io", "secret1").await.unwrap();

        service.set_display_name(&user.uid, "Alice").await.unwrap();

        assert_eq!(
            service.current_user().unwrap().display_name.as_deref(),
            Some("Alice")
        );
    }

    #[tokio::test]
    async fn sign_out_clears_current_identity() {
        let service = MemoryIdentityService::new();
        service.create_account("a@x.io", "secret1").await.unwrap();

        service.sign_out().await.unwrap();

        assert!(service.current_user().is_none());
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@x.io"));
        assert!(!is_valid_email("@x.io"));
        assert!(!is_valid_email("a@xio"));
        assert!(!is_valid_email("a@@x.io"));
        assert!(!is_valid_email("a b@x.io"));
    }
}
