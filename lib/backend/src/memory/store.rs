use crate::document::{Document, Fields, resolve_server_values};
use crate::error::StoreError;
use crate::query::Query;
use crate::store::DocumentStore;
use crate::subscription::{Snapshot, Subscription, SubscriptionHandle};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use ulid::Generator;

struct Subscriber {
    query: Query,
    sender: mpsc::UnboundedSender<Result<Snapshot, StoreError>>,
    handle: SubscriptionHandle,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        !self.handle.is_cancelled() && !self.sender.is_closed()
    }
}

struct State {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    subscribers: Vec<Subscriber>,
    ids: Generator,
    unavailable: Option<String>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            collections: HashMap::new(),
            subscribers: Vec::new(),
            ids: Generator::new(),
            unavailable: None,
        }
    }
}

impl State {
    fn check_available(&self) -> Result<(), StoreError> {
        match &self.unavailable {
            Some(message) => Err(StoreError::Unavailable {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn snapshot(&self, query: &Query) -> Snapshot {
        let mut documents: Vec<Document> = self
            .collections
            .get(&query.collection)
            .into_iter()
            .flat_map(|docs| docs.iter())
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .filter(|doc| query.matches(doc))
            .collect();
        query.sort(&mut documents);
        documents
    }

    /// Pushes a fresh snapshot to every live subscriber of `collection`.
    fn notify(&mut self, collection: &str) {
        self.subscribers.retain(Subscriber::is_live);
        let snapshots: Vec<(usize, Snapshot)> = self
            .subscribers
            .iter()
            .enumerate()
            .filter(|(_, s)| s.query.collection == collection)
            .map(|(idx, s)| (idx, self.snapshot(&s.query)))
            .collect();
        for (idx, snapshot) in snapshots {
            // A send failure means the receiver went away; pruned next round.
            let _ = self.subscribers[idx].sender.send(Ok(snapshot));
        }
    }

    fn next_id(&mut self) -> String {
        match self.ids.generate() {
            Ok(ulid) => ulid.to_string(),
            // Generator overflow within one millisecond; fall back to a fresh ULID.
            Err(_) => ulid::Ulid::new().to_string(),
        }
    }
}

/// An in-memory [`DocumentStore`].
///
/// Document ids come from a monotonic ULID generator, so id order equals
/// creation order. Server timestamps are taken from the wall clock in
/// microseconds.
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<State>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with `Unavailable`, or
    /// restores service when `message` is `None`.
    pub async fn set_unavailable(&self, message: Option<&str>) {
        self.state.lock().await.unavailable = message.map(str::to_string);
    }

    /// Ends every open subscription with a `StreamClosed` error.
    pub async fn interrupt_subscriptions(&self, message: &str) {
        let mut state = self.state.lock().await;
        for subscriber in state.subscribers.drain(..) {
            let _ = subscriber.sender.send(Err(StoreError::StreamClosed {
                message: message.to_string(),
            }));
        }
        debug!(message, "interrupted all subscriptions");
    }

    /// Counts subscriptions still receiving updates for `collection`.
    pub async fn active_subscriptions(&self, collection: &str) -> usize {
        let mut state = self.state.lock().await;
        state.subscribers.retain(Subscriber::is_live);
        state
            .subscribers
            .iter()
            .filter(|s| s.query.collection == collection)
            .count()
    }

    /// Counts documents in `collection`.
    pub async fn document_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .await
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let mut fields = fields;
        resolve_server_values(&mut fields, Utc::now().timestamp_micros());
        let existing = state
            .collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        existing.extend(fields);
        state.notify(collection);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn append(&self, collection: &str, fields: Fields) -> Result<Document, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let id = state.next_id();
        let mut fields = fields;
        resolve_server_values(&mut fields, Utc::now().timestamp_micros());
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields.clone());
        state.notify(collection);
        debug!(collection, id = %id, "document appended");
        Ok(Document::new(id, fields))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let mut fields = fields;
        resolve_server_values(&mut fields, Utc::now().timestamp_micros());
        let existing = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        existing.extend(fields);
        state.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        state.notify(collection);
        Ok(())
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = SubscriptionHandle::new();
        let initial = state.snapshot(&query);
        let _ = sender.send(Ok(initial));
        debug!(collection = %query.collection, "subscription opened");
        state.subscribers.push(Subscriber {
            query,
            sender,
            handle: handle.clone(),
        });
        Ok(Subscription::new(receiver, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SERVER_TIMESTAMP;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn upsert_merges_into_existing_document() {
        let store = MemoryDocumentStore::new();
        store
            .upsert("users", "a1", fields(json!({"uid": "a1", "email": "a@x.io"})))
            .await
            .unwrap();
        store
            .upsert("users", "a1", fields(json!({"lastLogin": 5})))
            .await
            .unwrap();

        let doc = store.get("users", "a1").await.unwrap().unwrap();
        assert_eq!(doc.get_str("email"), Some("a@x.io"));
        assert_eq!(doc.get("lastLogin"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids_and_server_time() {
        let store = MemoryDocumentStore::new();
        let first = store
            .append("messages", fields(json!({"timestamp": SERVER_TIMESTAMP})))
            .await
            .unwrap();
        let second = store
            .append("messages", fields(json!({"timestamp": SERVER_TIMESTAMP})))
            .await
            .unwrap();

        assert!(first.id < second.id);
        assert!(first.get("timestamp").unwrap().is_i64());
    }

    #[tokio::test]
    async fn update_and_delete_missing_document_fail() {
        let store = MemoryDocumentStore::new();
        let err = store
            .update("messages", "nope", fields(json!({"text": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let err = store.delete("messages", "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn subscription_receives_initial_and_updated_snapshots() {
        let store = MemoryDocumentStore::new();
        store
            .upsert("users", "a1", fields(json!({"uid": "a1"})))
            .await
            .unwrap();

        let mut sub = store
            .subscribe(Query::collection("users").where_not_equal("uid", "a1"))
            .await
            .unwrap();
        assert!(sub.next_snapshot().await.unwrap().unwrap().is_empty());

        store
            .upsert("users", "b1", fields(json!({"uid": "b1"})))
            .await
            .unwrap();
        let snapshot = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "b1");
    }

    #[tokio::test]
    async fn cancelled_subscription_is_pruned() {
        let store = MemoryDocumentStore::new();
        let sub = store.subscribe(Query::collection("users")).await.unwrap();
        assert_eq!(store.active_subscriptions("users").await, 1);

        sub.cancel();
        assert_eq!(store.active_subscriptions("users").await, 0);
    }

    #[tokio::test]
    async fn unavailable_store_rejects_writes() {
        let store = MemoryDocumentStore::new();
        store.set_unavailable(Some("offline")).await;

        let err = store
            .append("messages", fields(json!({"text": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert_eq!(store.document_count("messages").await, 0);

        store.set_unavailable(None).await;
        assert!(store.append("messages", Fields::new()).await.is_ok());
    }

    #[tokio::test]
    async fn interrupt_delivers_stream_error() {
        let store = MemoryDocumentStore::new();
        let mut sub = store.subscribe(Query::collection("users")).await.unwrap();
        let _ = sub.next_snapshot().await;

        store.interrupt_subscriptions("connection reset").await;

        let err = sub.next_snapshot().await.unwrap().unwrap_err();
        assert!(matches!(err, StoreError::StreamClosed { .. }));
        assert!(sub.next_snapshot().await.is_none());
    }
}
