//! Live message history of the selected conversation.
//!
//! A [`ConversationStore`] follows one conversation at a time:
//!
//! ```text
//! Unsubscribed --open--> Subscribing --first snapshot--> Live
//!      ^                                                  |
//!      +------------------- close / open ------------------+
//!                                                          |
//!                         Interrupted <--stream dropped----+
//! ```
//!
//! Opening a conversation always tears the previous subscription down
//! first. Each pump task carries the generation it was started under and
//! publishes only while that generation is still current, so a torn-down
//! subscription can never write into the next conversation's view.

use crate::error::{DeleteError, EditError, SendError};
use crate::message::{ConversationKey, MESSAGES_COLLECTION, Message, sort_messages};
use pairchat_backend::{
    DocumentStore, Query, Snapshot, StoreError, Subscription, SubscriptionHandle,
};
use pairchat_core::{MessageId, SubscriptionError, UserId};
use rootcause::prelude::Report;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of the followed conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationState {
    /// No subscription; no messages.
    #[default]
    Unsubscribed,
    /// Subscription requested, nothing delivered yet.
    Subscribing,
    /// Receiving snapshots.
    Live,
    /// The stream dropped. The last messages stay visible until reopened.
    Interrupted,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsubscribed => write!(f, "unsubscribed"),
            Self::Subscribing => write!(f, "subscribing"),
            Self::Live => write!(f, "live"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Read-only view of the followed conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationView {
    /// The followed pair, if any.
    pub key: Option<ConversationKey>,
    pub state: ConversationState,
    /// Messages of `key`, ordered by timestamp then id.
    pub messages: Vec<Message>,
    /// Why the view is `Interrupted` or failed to open.
    pub error: Option<SubscriptionError>,
}

struct Active {
    me: UserId,
    peer: UserId,
    handle: SubscriptionHandle,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Shared {
    generation: u64,
    active: Option<Active>,
}

impl Shared {
    /// Invalidates the running pump and releases its subscription.
    fn teardown(&mut self) -> Option<Active> {
        self.generation += 1;
        let mut active = self.active.take()?;
        active.handle.cancel();
        if let Some(task) = active.task.take() {
            task.abort();
        }
        Some(active)
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps the messages of `key` from a participant snapshot, in order.
fn conversation_messages(snapshot: &Snapshot, key: &ConversationKey) -> Vec<Message> {
    let mut messages: Vec<Message> = snapshot
        .iter()
        .filter_map(Message::from_document)
        .filter(|message| message.belongs_to(key))
        .collect();
    sort_messages(&mut messages);
    messages
}

fn messages_query(me: &UserId) -> Query {
    Query::collection(MESSAGES_COLLECTION)
        .where_array_contains("participants", me.as_str())
        .order_by("timestamp")
}

/// Follows one conversation and writes messages to the store.
pub struct ConversationStore<S: DocumentStore + 'static> {
    store: Arc<S>,
    shared: Arc<Mutex<Shared>>,
    view: Arc<watch::Sender<ConversationView>>,
}

impl<S: DocumentStore + 'static> ConversationStore<S> {
    /// Creates a store following nothing.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        let (view, _) = watch::channel(ConversationView::default());
        Self {
            store,
            shared: Arc::new(Mutex::new(Shared::default())),
            view: Arc::new(view),
        }
    }

    /// Returns the current view.
    #[must_use]
    pub fn view(&self) -> ConversationView {
        self.view.borrow().clone()
    }

    /// Returns a receiver notified on every view change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConversationView> {
        self.view.subscribe()
    }

    /// Returns the followed pair, if any.
    #[must_use]
    pub fn key(&self) -> Option<ConversationKey> {
        self.view.borrow().key.clone()
    }

    /// Follows the conversation between `me` and `peer`.
    ///
    /// Any previous subscription is released before the new one is
    /// requested. The view moves to `Subscribing` immediately and to
    /// `Live` on the first snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::EstablishFailed`] if the store refuses
    /// the subscription. The view is then `Unsubscribed` with the error set.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[instrument(skip(self, me, peer), fields(me = %me, peer = %peer))]
    pub async fn open(&self, me: UserId, peer: UserId) -> Result<(), Report<SubscriptionError>> {
        let key = ConversationKey::new(me.clone(), peer.clone());
        let generation = {
            let mut shared = lock(&self.shared);
            if shared.teardown().is_some() {
                debug!("released previous conversation subscription");
            }
            self.view.send_replace(ConversationView {
                key: Some(key.clone()),
                state: ConversationState::Subscribing,
                messages: Vec::new(),
                error: None,
            });
            shared.generation
        };

        let subscription = match self.store.subscribe(messages_query(&me)).await {
            Ok(subscription) => subscription,
            Err(e) => {
                let error = SubscriptionError::EstablishFailed {
                    message: e.to_string(),
                };
                let shared = lock(&self.shared);
                if shared.generation == generation {
                    self.view.send_replace(ConversationView {
                        key: None,
                        state: ConversationState::Unsubscribed,
                        messages: Vec::new(),
                        error: Some(error.clone()),
                    });
                }
                warn!(error = %e, "failed to open conversation");
                return Err(error.into());
            }
        };

        let mut shared = lock(&self.shared);
        if shared.generation != generation {
            // Superseded by a concurrent open or close while subscribing.
            subscription.cancel();
            return Ok(());
        }
        let handle = subscription.handle();
        let task = tokio::spawn(pump(
            subscription,
            key,
            generation,
            Arc::clone(&self.shared),
            Arc::clone(&self.view),
        ));
        shared.active = Some(Active {
            me,
            peer,
            handle,
            task: Some(task),
        });
        info!("conversation opened");
        Ok(())
    }

    /// Re-subscribes the current conversation, typically after it was
    /// interrupted. Does nothing if no conversation is open.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub async fn reopen(&self) -> Result<(), Report<SubscriptionError>> {
        let pair = lock(&self.shared)
            .active
            .as_ref()
            .map(|active| (active.me.clone(), active.peer.clone()));
        match pair {
            Some((me, peer)) => self.open(me, peer).await,
            None => Ok(()),
        }
    }

    /// Stops following the current conversation and empties the view.
    ///
    /// Takes effect before returning: no further snapshot reaches the view.
    pub fn close(&self) {
        let mut shared = lock(&self.shared);
        if shared.teardown().is_some() {
            debug!("conversation closed");
        }
        self.view.send_replace(ConversationView::default());
    }

    /// Sends `text` from `sender` to `receiver`.
    ///
    /// The store assigns the id and timestamp. The returned message is the
    /// confirmed write; it reaches the view only through the subscription,
    /// so it is never shown twice.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::EmptyText`] for blank text, otherwise
    /// [`SendError::NetworkOrBackendFailure`] if the write fails.
    #[instrument(
        skip(self, text, sender, receiver),
        fields(sender = %sender, receiver = %receiver)
    )]
    pub async fn send(
        &self,
        text: &str,
        sender: &UserId,
        receiver: &UserId,
    ) -> Result<Message, Report<SendError>> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyText.into());
        }
        let document = self
            .store
            .append(MESSAGES_COLLECTION, Message::new_fields(text, sender, receiver))
            .await
            .map_err(|e| SendError::NetworkOrBackendFailure {
                message: e.to_string(),
            })?;
        let message =
            Message::from_document(&document).ok_or_else(|| SendError::NetworkOrBackendFailure {
                message: format!("store returned a malformed message {}", document.id),
            })?;
        debug!(message_id = %message.id, "message sent");
        Ok(message)
    }

    /// Replaces the text of a message and marks it edited.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::EmptyText`] for blank text,
    /// [`EditError::NotFound`] if the message does not exist, otherwise
    /// [`EditError::NetworkOrBackendFailure`] if the write fails.
    #[instrument(skip(self, text), fields(message_id = %message_id))]
    pub async fn edit(&self, message_id: &MessageId, text: &str) -> Result<(), Report<EditError>> {
        if text.trim().is_empty() {
            return Err(EditError::EmptyText.into());
        }
        self.store
            .update(
                MESSAGES_COLLECTION,
                message_id.as_str(),
                Message::edit_fields(text),
            )
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => EditError::NotFound {
                    message_id: message_id.clone(),
                },
                other => EditError::NetworkOrBackendFailure {
                    message: other.to_string(),
                },
            })?;
        debug!("message edited");
        Ok(())
    }

    /// Removes a message.
    ///
    /// # Errors
    ///
    /// Returns [`DeleteError::NotFound`] if the message does not exist,
    /// otherwise [`DeleteError::NetworkOrBackendFailure`] if the write fails.
    #[instrument(skip(self), fields(message_id = %message_id))]
    pub async fn delete(&self, message_id: &MessageId) -> Result<(), Report<DeleteError>> {
        self.store
            .delete(MESSAGES_COLLECTION, message_id.as_str())
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => DeleteError::NotFound {
                    message_id: message_id.clone(),
                },
                other => DeleteError::NetworkOrBackendFailure {
                    message: other.to_string(),
                },
            })?;
        debug!("message deleted");
        Ok(())
    }
}

impl<S: DocumentStore + 'static> Drop for ConversationStore<S> {
    fn drop(&mut self) {
        lock(&self.shared).teardown();
    }
}

async fn pump(
    mut subscription: Subscription,
    key: ConversationKey,
    generation: u64,
    shared: Arc<Mutex<Shared>>,
    view: Arc<watch::Sender<ConversationView>>,
) {
    while let Some(next) = subscription.next_snapshot().await {
        // Publish under the lock so teardown cannot interleave.
        let current = lock(&shared);
        if current.generation != generation {
            return;
        }
        match next {
            Ok(snapshot) => {
                let messages = conversation_messages(&snapshot, &key);
                debug!(count = messages.len(), "conversation snapshot");
                view.send_replace(ConversationView {
                    key: Some(key.clone()),
                    state: ConversationState::Live,
                    messages,
                    error: None,
                });
            }
            Err(e) => {
                warn!(error = %e, "conversation subscription dropped");
                interrupt(&view, e.to_string());
                return;
            }
        }
    }

    let current = lock(&shared);
    if current.generation == generation {
        warn!("conversation subscription closed by the store");
        interrupt(&view, "stream closed".to_string());
    }
}

fn interrupt(view: &watch::Sender<ConversationView>, message: String) {
    view.send_modify(|view| {
        view.state = ConversationState::Interrupted;
        view.error = Some(SubscriptionError::Dropped { message });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairchat_backend::MemoryDocumentStore;
    use std::time::Duration;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn conversation() -> (ConversationStore<MemoryDocumentStore>, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        (ConversationStore::new(Arc::clone(&store)), store)
    }

    /// Waits until the view satisfies `predicate`.
    async fn wait_for<S, F>(conversation: &ConversationStore<S>, predicate: F) -> ConversationView
    where
        S: DocumentStore + 'static,
        F: Fn(&ConversationView) -> bool,
    {
        let mut rx = conversation.watch();
        let view = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|v| predicate(v)))
            .await
            .expect("view reached expected state")
            .expect("view sender alive");
        view.clone()
    }

    #[tokio::test]
    async fn open_goes_live_with_existing_history() {
        let (conversation, _) = conversation();
        conversation
            .send("earlier", &user("b1"), &user("a1"))
            .await
            .unwrap();

        conversation.open(user("a1"), user("b1")).await.unwrap();
        let view = wait_for(&conversation, |v| v.state == ConversationState::Live).await;

        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].text, "earlier");
    }

    #[tokio::test]
    async fn send_appears_exactly_once() {
        let (conversation, _) = conversation();
        conversation.open(user("a1"), user("b1")).await.unwrap();
        wait_for(&conversation, |v| v.state == ConversationState::Live).await;

        let sent = conversation
            .send("hello", &user("a1"), &user("b1"))
            .await
            .unwrap();
        assert_eq!(sent.participants, [user("a1"), user("b1")]);

        let view = wait_for(&conversation, |v| !v.messages.is_empty()).await;
        let matching: Vec<_> = view.messages.iter().filter(|m| m.text == "hello").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].id, sent.id);
    }

    #[tokio::test]
    async fn other_conversations_are_filtered_out() {
        let (conversation, _) = conversation();
        conversation
            .send("to carol", &user("a1"), &user("c1"))
            .await
            .unwrap();
        conversation
            .send("to bob", &user("a1"), &user("b1"))
            .await
            .unwrap();

        conversation.open(user("a1"), user("b1")).await.unwrap();
        let view = wait_for(&conversation, |v| v.state == ConversationState::Live).await;

        let key = ConversationKey::new(user("a1"), user("b1"));
        assert_eq!(view.messages.len(), 1);
        assert!(view.messages.iter().all(|m| m.belongs_to(&key)));
    }

    #[tokio::test]
    async fn messages_stay_ordered() {
        let (conversation, _) = conversation();
        conversation.open(user("a1"), user("b1")).await.unwrap();
        for text in ["one", "two", "three"] {
            conversation
                .send(text, &user("a1"), &user("b1"))
                .await
                .unwrap();
        }

        let view = wait_for(&conversation, |v| v.messages.len() == 3).await;

        let texts: Vec<&str> = view.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert!(view.messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn switching_peer_releases_previous_subscription() {
        let (conversation, store) = conversation();
        conversation.open(user("a1"), user("b1")).await.unwrap();
        conversation.open(user("a1"), user("c1")).await.unwrap();

        assert_eq!(store.active_subscriptions(MESSAGES_COLLECTION).await, 1);

        conversation
            .send("for bob", &user("a1"), &user("b1"))
            .await
            .unwrap();
        conversation
            .send("for carol", &user("a1"), &user("c1"))
            .await
            .unwrap();
        let view = wait_for(&conversation, |v| !v.messages.is_empty()).await;

        assert_eq!(view.key, Some(ConversationKey::new(user("a1"), user("c1"))));
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].text, "for carol");
    }

    #[tokio::test]
    async fn close_stops_delivery() {
        let (conversation, store) = conversation();
        conversation.open(user("a1"), user("b1")).await.unwrap();
        wait_for(&conversation, |v| v.state == ConversationState::Live).await;

        conversation.close();
        assert_eq!(store.active_subscriptions(MESSAGES_COLLECTION).await, 0);

        conversation
            .send("late", &user("b1"), &user("a1"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(conversation.view(), ConversationView::default());
    }

    #[tokio::test]
    async fn open_failure_is_surfaced() {
        let (conversation, store) = conversation();
        store.set_unavailable(Some("offline")).await;

        let err = conversation
            .open(user("a1"), user("b1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            SubscriptionError::EstablishFailed { .. }
        ));
        let view = conversation.view();
        assert_eq!(view.state, ConversationState::Unsubscribed);
        assert!(view.error.is_some());
    }

    #[tokio::test]
    async fn dropped_stream_interrupts_and_reopen_recovers() {
        let (conversation, store) = conversation();
        conversation
            .send("kept", &user("a1"), &user("b1"))
            .await
            .unwrap();
        conversation.open(user("a1"), user("b1")).await.unwrap();
        wait_for(&conversation, |v| v.state == ConversationState::Live).await;

        store.interrupt_subscriptions("connection reset").await;
        let view = wait_for(&conversation, |v| v.state == ConversationState::Interrupted).await;
        assert_eq!(view.messages.len(), 1);
        assert!(matches!(view.error, Some(SubscriptionError::Dropped { .. })));

        conversation.reopen().await.unwrap();
        let view = wait_for(&conversation, |v| v.state == ConversationState::Live).await;
        assert!(view.error.is_none());
        assert_eq!(view.messages.len(), 1);
    }

    #[tokio::test]
    async fn edit_and_delete_are_confirmed_through_push() {
        let (conversation, store) = conversation();
        conversation.open(user("a1"), user("b1")).await.unwrap();
        let sent = conversation
            .send("draft", &user("a1"), &user("b1"))
            .await
            .unwrap();
        wait_for(&conversation, |v| v.messages.len() == 1).await;

        conversation.edit(&sent.id, "final").await.unwrap();
        let view = wait_for(&conversation, |v| v.messages.iter().any(|m| m.edited)).await;
        assert_eq!(view.messages[0].text, "final");

        let stored = store
            .get(MESSAGES_COLLECTION, sent.id.as_str())
            .await
            .unwrap()
            .and_then(|doc| Message::from_document(&doc))
            .unwrap();
        assert_eq!(stored.text, "final");
        assert!(stored.edited);

        conversation.delete(&sent.id).await.unwrap();
        wait_for(&conversation, |v| v.messages.is_empty()).await;
        assert!(
            store
                .get(MESSAGES_COLLECTION, sent.id.as_str())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn failed_writes_leave_view_untouched() {
        let (conversation, store) = conversation();
        conversation.open(user("a1"), user("b1")).await.unwrap();
        let sent = conversation
            .send("hello", &user("a1"), &user("b1"))
            .await
            .unwrap();
        let before = wait_for(&conversation, |v| v.messages.len() == 1).await;

        store.set_unavailable(Some("offline")).await;
        let err = conversation
            .send("lost", &user("a1"), &user("b1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            SendError::NetworkOrBackendFailure { .. }
        ));
        let err = conversation.edit(&sent.id, "changed").await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            EditError::NetworkOrBackendFailure { .. }
        ));
        let err = conversation.delete(&sent.id).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            DeleteError::NetworkOrBackendFailure { .. }
        ));

        assert_eq!(conversation.view(), before);
    }

    #[tokio::test]
    async fn blank_text_and_missing_messages_are_rejected() {
        let (conversation, _) = conversation();

        let err = conversation
            .send("   ", &user("a1"), &user("b1"))
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &SendError::EmptyText);

        let missing = MessageId::new("missing");
        let err = conversation.edit(&missing, "x").await.unwrap_err();
        assert_eq!(
            err.current_context(),
            &EditError::NotFound {
                message_id: missing.clone()
            }
        );
        let err = conversation.delete(&missing).await.unwrap_err();
        assert_eq!(
            err.current_context(),
            &DeleteError::NotFound {
                message_id: missing
            }
        );
    }
}
