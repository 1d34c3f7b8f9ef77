//! Live contact feed.
//!
//! A feed merges two sources into one replacement list: the push
//! subscription on the `users` collection and a periodic full refresh.
//! If the push stream drops, the error is surfaced on the list and the
//! periodic refresh keeps the list current.

use crate::directory::{decode_contacts, read_contacts};
use pairchat_backend::{DocumentStore, Snapshot, StoreError, Subscription, SubscriptionHandle};
use pairchat_core::{SubscriptionError, UserId};
use pairchat_identity::User;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// The latest contact list delivered by a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactList {
    /// Every known user except the signed-in one.
    pub contacts: Vec<User>,
    /// The most recent failure, cleared by the next successful delivery.
    pub error: Option<SubscriptionError>,
    /// Number of deliveries so far, successful or not.
    pub revision: u64,
}

/// A running contact subscription.
///
/// Dropping the feed stops both the push subscription and the periodic
/// refresh.
pub struct ContactFeed {
    receiver: watch::Receiver<ContactList>,
    push: SubscriptionHandle,
    stop: SubscriptionHandle,
    task: JoinHandle<()>,
}

impl ContactFeed {
    pub(crate) fn spawn<S>(
        store: Arc<S>,
        exclude: UserId,
        refresh_interval: Duration,
        subscription: Subscription,
        sender: watch::Sender<ContactList>,
        receiver: watch::Receiver<ContactList>,
    ) -> Self
    where
        S: DocumentStore + 'static,
    {
        let push = subscription.handle();
        let stop = SubscriptionHandle::new();
        let task = tokio::spawn(run_feed(
            store,
            exclude,
            refresh_interval,
            subscription,
            stop.clone(),
            sender,
        ));
        Self {
            receiver,
            push,
            stop,
            task,
        }
    }

    /// Returns the latest contact list.
    #[must_use]
    pub fn current(&self) -> ContactList {
        self.receiver.borrow().clone()
    }

    /// Returns the latest contacts.
    #[must_use]
    pub fn contacts(&self) -> Vec<User> {
        self.receiver.borrow().contacts.clone()
    }

    /// Returns a receiver that observes every delivery.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ContactList> {
        self.receiver.clone()
    }

    /// Waits for the next delivery. Returns false once the feed has stopped.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Stops the feed.
    pub fn cancel(self) {}
}

impl Drop for ContactFeed {
    fn drop(&mut self) {
        self.stop.cancel();
        self.push.cancel();
        self.task.abort();
    }
}

fn publish(sender: &watch::Sender<ContactList>, result: Result<Vec<User>, SubscriptionError>) {
    sender.send_modify(|list| {
        list.revision += 1;
        match result {
            Ok(contacts) => {
                list.contacts = contacts;
                list.error = None;
            }
            Err(error) => list.error = Some(error),
        }
    });
}

/// Next push delivery, or never once the push stream is gone.
async fn next_push(push: &mut Option<Subscription>) -> Option<Result<Snapshot, StoreError>> {
    match push {
        Some(subscription) => subscription.next_snapshot().await,
        None => std::future::pending().await,
    }
}

async fn run_feed<S>(
    store: Arc<S>,
    exclude: UserId,
    refresh_interval: Duration,
    subscription: Subscription,
    stop: SubscriptionHandle,
    sender: watch::Sender<ContactList>,
) where
    S: DocumentStore + 'static,
{
    // `stop` belongs to the feed. The push handle is cancelled whenever the
    // push stream is given up, which must not end the periodic refresh.
    let mut push = Some(subscription);
    let mut interval = tokio::time::interval_at(
        tokio::time::Instant::now() + refresh_interval,
        refresh_interval,
    );
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            next = next_push(&mut push) => match next {
                Some(Ok(snapshot)) => {
                    let contacts = decode_contacts(&snapshot, &exclude);
                    debug!(count = contacts.len(), "contacts pushed");
                    publish(&sender, Ok(contacts));
                }
                Some(Err(e)) => {
                    warn!(error = %e, "contact subscription dropped");
                    push = None;
                    publish(
                        &sender,
                        Err(SubscriptionError::Dropped {
                            message: e.to_string(),
                        }),
                    );
                }
                None if stop.is_cancelled() => return,
                None => {
                    warn!("contact subscription closed by the store");
                    push = None;
                    publish(
                        &sender,
                        Err(SubscriptionError::Dropped {
                            message: "stream closed".to_string(),
                        }),
                    );
                }
            },
            _ = interval.tick() => {
                let result = read_contacts(store.as_ref(), &exclude).await;
                if stop.is_cancelled() {
                    return;
                }
                if let Err(e) = &result {
                    warn!(error = %e, "periodic contact refresh failed");
                }
                publish(&sender, result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::directory::ContactDirectory;
    use pairchat_backend::{DocumentStore, MemoryDocumentStore};
    use pairchat_core::{SubscriptionError, UserId};
    use pairchat_identity::{USERS_COLLECTION, User, upsert_user_record};
    use std::sync::Arc;
    use std::time::Duration;

    const LONG: Duration = Duration::from_secs(3600);

    async fn next(feed: &mut super::ContactFeed) {
        let delivered = tokio::time::timeout(Duration::from_secs(1), feed.changed())
            .await
            .expect("feed delivered");
        assert!(delivered, "feed stopped");
    }

    #[tokio::test]
    async fn feed_delivers_full_replacement_on_push() {
        let store = Arc::new(MemoryDocumentStore::new());
        let directory = ContactDirectory::new(Arc::clone(&store));
        let me = User::new("a1", "Ann", "ann@x.io");
        upsert_user_record(store.as_ref(), &me).await.unwrap();

        let mut feed = directory.subscribe(me.id.clone(), LONG).await.unwrap();
        next(&mut feed).await;
        assert!(feed.contacts().is_empty());

        upsert_user_record(store.as_ref(), &User::new("b1", "Ben", "ben@x.io"))
            .await
            .unwrap();
        next(&mut feed).await;

        let list = feed.current();
        assert_eq!(list.contacts.len(), 1);
        assert_eq!(list.contacts[0].id, UserId::new("b1"));
        assert!(list.error.is_none());
    }

    #[tokio::test]
    async fn dropped_push_is_surfaced_and_polling_continues() {
        tokio::time::pause();
        let store = Arc::new(MemoryDocumentStore::new());
        let directory = ContactDirectory::new(Arc::clone(&store));
        let mut feed = directory
            .subscribe(UserId::new("a1"), Duration::from_secs(30))
            .await
            .unwrap();
        next(&mut feed).await;

        store.interrupt_subscriptions("connection reset").await;
        next(&mut feed).await;
        assert!(matches!(
            feed.current().error,
            Some(SubscriptionError::Dropped { .. })
        ));

        upsert_user_record(store.as_ref(), &User::new("b1", "Ben", "ben@x.io"))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        next(&mut feed).await;

        let list = feed.current();
        assert!(list.error.is_none());
        assert_eq!(list.contacts.len(), 1);

        upsert_user_record(store.as_ref(), &User::new("c1", "Cat", "cat@x.io"))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        next(&mut feed).await;
        assert_eq!(feed.contacts().len(), 2);
    }

    #[tokio::test]
    async fn dropping_feed_releases_subscription() {
        let store = Arc::new(MemoryDocumentStore::new());
        let directory = ContactDirectory::new(Arc::clone(&store));
        let feed = directory.subscribe(UserId::new("a1"), LONG).await.unwrap();
        assert_eq!(store.active_subscriptions(USERS_COLLECTION).await, 1);

        feed.cancel();

        assert_eq!(store.active_subscriptions(USERS_COLLECTION).await, 0);
        assert!(store.get(USERS_COLLECTION, "a1").await.unwrap().is_none());
    }
}
