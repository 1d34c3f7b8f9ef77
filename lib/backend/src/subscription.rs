//! Realtime subscription handles.
//!
//! A [`Subscription`] yields full result snapshots in the order the store
//! emits them. Each snapshot replaces the previous one. The store stops
//! delivering as soon as the subscription, or any [`SubscriptionHandle`]
//! cloned from it, is cancelled.

use crate::document::Document;
use crate::error::StoreError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// One complete result set of a query.
pub type Snapshot = Vec<Document>;

/// Cancellation side of a subscription.
///
/// Cloning shares the same cancellation flag, so a consumer can hand the
/// stream to a task and keep a handle to tear it down synchronously.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionHandle {
    cancelled: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Creates a live handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops delivery. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A stream of query snapshots.
///
/// Dropping the subscription cancels it.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
    handle: SubscriptionHandle,
}

impl Subscription {
    /// Wraps the receiving end of a store feed.
    #[must_use]
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
        handle: SubscriptionHandle,
    ) -> Self {
        Self { receiver, handle }
    }

    /// Returns a handle that can cancel this subscription from elsewhere.
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the subscription is cancelled or the store has
    /// closed the feed.
    pub async fn next_snapshot(&mut self) -> Option<Result<Snapshot, StoreError>> {
        if self.handle.is_cancelled() {
            return None;
        }
        let next = self.receiver.recv().await;
        if self.handle.is_cancelled() {
            return None;
        }
        next
    }

    /// Cancels the subscription and releases the feed.
    pub fn cancel(mut self) {
        self.handle.cancel();
        self.receiver.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
