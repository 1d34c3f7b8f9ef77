//! One-shot reads, live feeds and seeding of the contact directory.

use crate::error::DirectoryError;
use crate::feed::{ContactFeed, ContactList};
use crate::samples::sample_contacts;
use pairchat_backend::{DocumentStore, Query, Snapshot, StoreError};
use pairchat_core::{SubscriptionError, UserId};
use pairchat_identity::{USERS_COLLECTION, User};
use rootcause::prelude::Report;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument};

/// Query for every user record except `exclude`.
pub(crate) fn contacts_query(exclude: &UserId) -> Query {
    Query::collection(USERS_COLLECTION).where_not_equal("uid", exclude.as_str())
}

/// Decodes a users snapshot, dropping malformed records and `exclude`.
pub(crate) fn decode_contacts(snapshot: &Snapshot, exclude: &UserId) -> Vec<User> {
    snapshot
        .iter()
        .filter_map(User::from_document)
        .filter(|user| &user.id != exclude)
        .collect()
}

/// Reads the current contact set through a short-lived subscription.
pub(crate) async fn read_contacts<S>(
    store: &S,
    exclude: &UserId,
) -> Result<Vec<User>, SubscriptionError>
where
    S: DocumentStore + ?Sized,
{
    let mut subscription = store
        .subscribe(contacts_query(exclude))
        .await
        .map_err(|e| SubscriptionError::EstablishFailed {
            message: e.to_string(),
        })?;
    let first = subscription.next_snapshot().await;
    subscription.cancel();
    match first {
        Some(Ok(snapshot)) => Ok(decode_contacts(&snapshot, exclude)),
        Some(Err(e)) => Err(SubscriptionError::Dropped {
            message: e.to_string(),
        }),
        None => Err(SubscriptionError::Dropped {
            message: "subscription closed before the first snapshot".to_string(),
        }),
    }
}

fn backend_failure(err: StoreError) -> DirectoryError {
    DirectoryError::NetworkOrBackendFailure {
        message: err.to_string(),
    }
}

/// The list of other known users, backed by the `users` collection.
pub struct ContactDirectory<S: DocumentStore + 'static> {
    store: Arc<S>,
    /// The user the last successful seeding pass ran for.
    seeded_for: Mutex<Option<UserId>>,
}

impl<S: DocumentStore + 'static> ContactDirectory<S> {
    /// Creates a directory over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            seeded_for: Mutex::new(None),
        }
    }

    /// Returns every known user except `exclude`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Subscription`] if the store cannot deliver
    /// a snapshot.
    #[instrument(skip(self, exclude), fields(exclude = %exclude))]
    pub async fn refresh(&self, exclude: &UserId) -> Result<Vec<User>, Report<DirectoryError>> {
        let contacts = read_contacts(self.store.as_ref(), exclude)
            .await
            .map_err(DirectoryError::from)?;
        debug!(count = contacts.len(), "directory refreshed");
        Ok(contacts)
    }

    /// Follows the directory live.
    ///
    /// The feed is driven by a push subscription and, independently, by a
    /// full refresh every `refresh_interval`. Both deliver complete
    /// replacement lists; whichever arrives last wins.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Subscription`] if the push subscription
    /// cannot be opened.
    #[instrument(skip(self, exclude), fields(exclude = %exclude))]
    pub async fn subscribe(
        &self,
        exclude: UserId,
        refresh_interval: Duration,
    ) -> Result<ContactFeed, Report<DirectoryError>> {
        let subscription = self
            .store
            .subscribe(contacts_query(&exclude))
            .await
            .map_err(|e| {
                DirectoryError::from(SubscriptionError::EstablishFailed {
                    message: e.to_string(),
                })
            })?;
        let (sender, receiver) = watch::channel(ContactList::default());
        Ok(ContactFeed::spawn(
            Arc::clone(&self.store),
            exclude,
            refresh_interval,
            subscription,
            sender,
            receiver,
        ))
    }

    /// Inserts the placeholder contacts that are not yet in the store.
    ///
    /// Runs at most once per signed-in user: after one successful pass
    /// for `exclude`, later calls for the same user return `Ok(0)` without
    /// touching the store. A different user gets a fresh pass. Existence
    /// is checked by id, and `exclude` is never seeded. Returns the number
    /// of records created.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NetworkOrBackendFailure`] if a read or
    /// write fails; the pass can then be retried.
    #[instrument(skip(self, exclude), fields(exclude = %exclude))]
    pub async fn ensure_sample_contacts(
        &self,
        exclude: &UserId,
    ) -> Result<usize, Report<DirectoryError>> {
        let mut seeded_for = self.seeded_for.lock().await;
        if seeded_for.as_ref() == Some(exclude) {
            return Ok(0);
        }

        let mut created = 0;
        for sample in sample_contacts() {
            if &sample.id == exclude {
                continue;
            }
            let existing = self
                .store
                .get(USERS_COLLECTION, sample.id.as_str())
                .await
                .map_err(backend_failure)?;
            if existing.is_none() {
                self.store
                    .upsert(USERS_COLLECTION, sample.id.as_str(), sample.to_fields())
                    .await
                    .map_err(backend_failure)?;
                created += 1;
            }
        }

        *seeded_for = Some(exclude.clone());
        if created > 0 {
            info!(created, "seeded sample contacts");
        }
        Ok(created)
    }
}
