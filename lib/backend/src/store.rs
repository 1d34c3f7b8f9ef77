//! Document store contract.

use crate::document::{Document, Fields};
use crate::error::StoreError;
use crate::query::Query;
use crate::subscription::Subscription;
use async_trait::async_trait;

/// A keyed document database with realtime query subscriptions.
///
/// Writes merge into existing documents. Every successful write is
/// eventually reflected in each open subscription whose query it affects,
/// as a complete replacement snapshot.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates the document if absent, otherwise merges `fields` into it.
    async fn upsert(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Reads one document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Stores a new document under a store-generated id.
    ///
    /// Returns the document as written, with server values resolved.
    async fn append(&self, collection: &str, fields: Fields) -> Result<Document, StoreError>;

    /// Merges `fields` into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Removes a document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Opens a realtime subscription.
    ///
    /// The current result set is delivered first, then a fresh snapshot
    /// after every change affecting the query.
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;
}
