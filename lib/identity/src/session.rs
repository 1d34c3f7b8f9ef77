//! The signed-in identity of one client session.
//!
//! [`IdentitySession`] reports the current [`User`] (or none) exactly as
//! the identity service's change stream does, so sign-outs the service
//! reports on its own (expiry, another device) are seen immediately. At
//! most one change listener is active: registering a new one supersedes
//! the previous, and a superseded or dropped listener never fires again.

use crate::error::AuthError;
use crate::user::{User, upsert_user_record};
use pairchat_backend::{AuthUser, DocumentStore, IdentityService};
use rootcause::prelude::Report;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Default)]
struct ListenerSlot {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

fn lock(slot: &Mutex<ListenerSlot>) -> MutexGuard<'_, ListenerSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration of an identity change handler.
///
/// Dropping the listener unregisters the handler. Registering another
/// handler on the same session unregisters this one.
#[must_use = "the handler is unregistered when the listener is dropped"]
pub struct IdentityListener {
    generation: u64,
    slot: Arc<Mutex<ListenerSlot>>,
}

impl IdentityListener {
    /// Unregisters the handler.
    pub fn cancel(self) {}

    /// Returns true while this listener is the session's active one.
    #[must_use]
    pub fn is_active(&self) -> bool {
        lock(&self.slot).generation == self.generation
    }
}

impl Drop for IdentityListener {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot.generation == self.generation {
            slot.generation += 1;
            if let Some(task) = slot.task.take() {
                task.abort();
            }
        }
    }
}

/// The identity of the person using this client.
pub struct IdentitySession<I, S>
where
    I: IdentityService + 'static,
    S: DocumentStore + 'static,
{
    identity: Arc<I>,
    store: Arc<S>,
    changes: watch::Receiver<Option<AuthUser>>,
    listener: Arc<Mutex<ListenerSlot>>,
}

impl<I, S> IdentitySession<I, S>
where
    I: IdentityService + 'static,
    S: DocumentStore + 'static,
{
    /// Creates a session following `identity`.
    #[must_use]
    pub fn new(identity: Arc<I>, store: Arc<S>) -> Self {
        let changes = identity.identity_changes();
        Self {
            identity,
            store,
            changes,
            listener: Arc::new(Mutex::new(ListenerSlot::default())),
        }
    }

    /// Returns the signed-in user, if any.
    #[must_use]
    pub fn current(&self) -> Option<User> {
        self.changes.borrow().as_ref().map(User::from_auth)
    }

    /// Returns a receiver over the identity service's change stream.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<Option<AuthUser>> {
        self.identity.identity_changes()
    }

    /// Registers the handler for identity changes.
    ///
    /// The handler is called once with the current identity, then after
    /// every change the identity service reports. It runs on a Tokio task
    /// and may drop its own listener; a delivery already in progress then
    /// completes, and no later one starts.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn on_identity_change<F>(&self, handler: F) -> IdentityListener
    where
        F: Fn(Option<User>) + Send + Sync + 'static,
    {
        let mut changes = self.identity.identity_changes();
        let slot_ref = Arc::clone(&self.listener);

        let mut slot = lock(&self.listener);
        slot.generation += 1;
        let generation = slot.generation;
        if let Some(previous) = slot.task.take() {
            previous.abort();
            debug!("replaced identity listener");
        }

        slot.task = Some(tokio::spawn(async move {
            loop {
                let user = changes.borrow_and_update().as_ref().map(User::from_auth);
                if lock(&slot_ref).generation != generation {
                    return;
                }
                handler(user);
                if changes.changed().await.is_err() {
                    return;
                }
            }
        }));

        IdentityListener {
            generation,
            slot: Arc::clone(&self.listener),
        }
    }

    /// Signs in an existing account and refreshes its directory record.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`AuthError`] if the identity service rejects
    /// the credentials.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, Report<AuthError>> {
        let identity = self
            .identity
            .authenticate(email, password)
            .await
            .map_err(AuthError::from)?;
        let user = User::from_auth(&identity);
        self.record_user(&user).await;
        info!(user_id = %user.id, "signed in");
        Ok(user)
    }

    /// Registers a new account, names it and creates its directory record.
    ///
    /// An empty `display_name` leaves the profile unnamed.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`AuthError`] if registration or naming fails.
    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, Report<AuthError>> {
        let mut identity = self
            .identity
            .create_account(email, password)
            .await
            .map_err(AuthError::from)?;

        let display_name = display_name.trim();
        if !display_name.is_empty() {
            self.identity
                .set_display_name(&identity.uid, display_name)
                .await
                .map_err(AuthError::from)?;
            identity.display_name = Some(display_name.to_string());
        }

        let user = User::from_auth(&identity);
        self.record_user(&user).await;
        info!(user_id = %user.id, "account created");
        Ok(user)
    }

    /// Signs out the current account.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`AuthError`] if the identity service fails;
    /// the session keeps its user in that case.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), Report<AuthError>> {
        self.identity.sign_out().await.map_err(AuthError::from)?;
        info!("signed out");
        Ok(())
    }

    /// Writes the user's directory record. Failures do not block sign-in.
    async fn record_user(&self, user: &User) {
        if let Err(e) = upsert_user_record(self.store.as_ref(), user).await {
            warn!(user_id = %user.id, error = %e, "failed to upsert user record");
        }
    }
}

impl<I, S> Drop for IdentitySession<I, S>
where
    I: IdentityService + 'static,
    S: DocumentStore + 'static,
{
    fn drop(&mut self) {
        let mut slot = lock(&self.listener);
        slot.generation += 1;
        if let Some(task) = slot.task.take() {
            task.abort();
        }
    }
}
