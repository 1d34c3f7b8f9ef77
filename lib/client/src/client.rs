//! The chat session facade.
//!
//! The session follows the identity service: a sign-out it reports on its
//! own ends the session just like [`ChatClient::sign_out`], and a newly
//! reported user gets a fresh session.

use crate::config::ClientConfig;
use crate::error::{ClientError, lift};
use pairchat_backend::{AuthUser, DocumentStore, IdentityService};
use pairchat_conversation::{
    ConversationStore, ConversationView, DeleteError, EditError, Message, SelectionState,
};
use pairchat_core::{MessageId, Result, UserId};
use pairchat_directory::{ContactDirectory, ContactFeed, ContactList};
use pairchat_identity::{IdentityListener, IdentitySession, User};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// State that exists only while someone is signed in.
#[derive(Default)]
struct Session {
    user: Option<UserId>,
    contacts: Option<ContactFeed>,
    selection: SelectionState,
}

struct Inner<I, S>
where
    I: IdentityService + 'static,
    S: DocumentStore + 'static,
{
    config: ClientConfig,
    identity: IdentitySession<I, S>,
    directory: ContactDirectory<S>,
    conversation: ConversationStore<S>,
    session: Mutex<Session>,
}

/// One user's chat client.
///
/// Edit and delete are restricted to the message's sender here, on the
/// client. The document store does not enforce this.
pub struct ChatClient<I, S>
where
    I: IdentityService + 'static,
    S: DocumentStore + 'static,
{
    inner: Arc<Inner<I, S>>,
    follower: JoinHandle<()>,
}

impl<I, S> ChatClient<I, S>
where
    I: IdentityService + 'static,
    S: DocumentStore + 'static,
{
    /// Creates a client and starts following the identity service.
    ///
    /// If the service already reports a signed-in user, their session is
    /// started in the background.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(identity: Arc<I>, store: Arc<S>, config: ClientConfig) -> Self {
        let inner = Arc::new(Inner {
            identity: IdentitySession::new(identity, Arc::clone(&store)),
            directory: ContactDirectory::new(Arc::clone(&store)),
            conversation: ConversationStore::new(store),
            session: Mutex::new(Session::default()),
            config,
        });
        let follower = tokio::spawn(follow_identity(
            Arc::downgrade(&inner),
            inner.identity.changes(),
        ));
        Self { inner, follower }
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.inner.identity.current()
    }

    /// Registers the handler for identity changes. See
    /// [`IdentitySession::on_identity_change`].
    pub fn on_identity_change<F>(&self, handler: F) -> IdentityListener
    where
        F: Fn(Option<User>) + Send + Sync + 'static,
    {
        self.inner.identity.on_identity_change(handler)
    }

    /// Creates an account and starts its session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Auth`] if registration fails, or
    /// [`ClientError::Directory`] if the contact feed cannot start.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, ClientError> {
        let user = self
            .inner
            .identity
            .sign_up(email, password, display_name)
            .await
            .map_err(lift)?;
        self.inner.start_session(&user).await?;
        Ok(user)
    }

    /// Signs in and starts the session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Auth`] if the credentials are rejected, or
    /// [`ClientError::Directory`] if the contact feed cannot start.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let user = self
            .inner
            .identity
            .sign_in(email, password)
            .await
            .map_err(lift)?;
        self.inner.start_session(&user).await?;
        Ok(user)
    }

    /// Signs out and releases every subscription of the session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Auth`] if the identity service fails; the
    /// session is left untouched in that case.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        self.inner.identity.sign_out().await.map_err(lift)?;
        self.inner.end_session().await;
        Ok(())
    }

    fn require_user(&self) -> std::result::Result<User, ClientError> {
        self.inner.identity.current().ok_or(ClientError::NotSignedIn)
    }

    /// Returns the latest contact list. Empty while signed out.
    pub async fn contacts(&self) -> ContactList {
        self.inner
            .session
            .lock()
            .await
            .contacts
            .as_ref()
            .map(ContactFeed::current)
            .unwrap_or_default()
    }

    /// Returns a receiver following the contact list of this session.
    pub async fn watch_contacts(&self) -> Option<watch::Receiver<ContactList>> {
        self.inner
            .session
            .lock()
            .await
            .contacts
            .as_ref()
            .map(ContactFeed::watch)
    }

    /// Reads the contact list once, bypassing the live feed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotSignedIn`] or [`ClientError::Directory`].
    pub async fn refresh_contacts(&self) -> Result<Vec<User>, ClientError> {
        let me = self.require_user()?;
        let contacts = self.inner.directory.refresh(&me.id).await.map_err(lift)?;
        Ok(contacts)
    }

    /// Selects `contact` and follows the conversation with them.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotSignedIn`], or
    /// [`ClientError::Subscription`] if the conversation cannot be opened.
    #[instrument(skip(self, contact), fields(contact = %contact.id))]
    pub async fn select_contact(&self, contact: User) -> Result<(), ClientError> {
        let me = self.require_user()?;
        let peer = contact.id.clone();
        let mut session = self.inner.session.lock().await;
        session.selection.select(contact);
        self.inner
            .conversation
            .open(me.id, peer)
            .await
            .map_err(lift)?;
        Ok(())
    }

    /// Clears the selection and stops following the conversation.
    pub async fn clear_selection(&self) {
        let mut session = self.inner.session.lock().await;
        session.selection.clear();
        self.inner.conversation.close();
    }

    /// Returns the selected contact, if any.
    pub async fn selected(&self) -> Option<User> {
        self.inner.session.lock().await.selection.current().cloned()
    }

    /// Returns the view of the followed conversation.
    #[must_use]
    pub fn conversation(&self) -> ConversationView {
        self.inner.conversation.view()
    }

    /// Returns a receiver following the conversation view.
    #[must_use]
    pub fn watch_conversation(&self) -> watch::Receiver<ConversationView> {
        self.inner.conversation.watch()
    }

    /// Re-subscribes an interrupted conversation.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Subscription`] if the store refuses.
    pub async fn reopen_conversation(&self) -> Result<(), ClientError> {
        self.inner.conversation.reopen().await.map_err(lift)?;
        Ok(())
    }

    /// Sends `text` to the selected contact.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotSignedIn`], [`ClientError::NoSelection`] or
    /// [`ClientError::Send`].
    pub async fn send(&self, text: &str) -> Result<Message, ClientError> {
        let me = self.require_user()?;
        let peer = self.selected().await.ok_or(ClientError::NoSelection)?;
        let message = self
            .inner
            .conversation
            .send(text, &me.id, &peer.id)
            .await
            .map_err(lift)?;
        Ok(message)
    }

    /// Edits one of the current user's messages.
    ///
    /// Only messages visible in the followed conversation can be edited.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotSignedIn`], or [`ClientError::Edit`] with
    /// `NotFound`, `NotOwner`, `EmptyText` or a backend failure.
    pub async fn edit_message(
        &self,
        message_id: &MessageId,
        text: &str,
    ) -> Result<(), ClientError> {
        let me = self.require_user()?;
        let message_id = message_id.clone();
        match self.ownership(&me, &message_id) {
            Ownership::Own => {}
            Ownership::Missing => {
                return Err(ClientError::from(EditError::NotFound { message_id }).into());
            }
            Ownership::Foreign => {
                return Err(ClientError::from(EditError::NotOwner { message_id }).into());
            }
        }
        self.inner
            .conversation
            .edit(&message_id, text)
            .await
            .map_err(lift)?;
        Ok(())
    }

    /// Deletes one of the current user's messages.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotSignedIn`], or [`ClientError::Delete`]
    /// with `NotFound`, `NotOwner` or a backend failure.
    pub async fn delete_message(&self, message_id: &MessageId) -> Result<(), ClientError> {
        let me = self.require_user()?;
        let message_id = message_id.clone();
        match self.ownership(&me, &message_id) {
            Ownership::Own => {}
            Ownership::Missing => {
                return Err(ClientError::from(DeleteError::NotFound { message_id }).into());
            }
            Ownership::Foreign => {
                return Err(ClientError::from(DeleteError::NotOwner { message_id }).into());
            }
        }
        self.inner
            .conversation
            .delete(&message_id)
            .await
            .map_err(lift)?;
        Ok(())
    }

    /// Checks `message_id` against the followed conversation.
    fn ownership(&self, me: &User, message_id: &MessageId) -> Ownership {
        let view = self.inner.conversation.view();
        match view.messages.iter().find(|message| &message.id == message_id) {
            None => Ownership::Missing,
            Some(message) if message.sender_id == me.id => Ownership::Own,
            Some(_) => Ownership::Foreign,
        }
    }
}

impl<I, S> Drop for ChatClient<I, S>
where
    I: IdentityService + 'static,
    S: DocumentStore + 'static,
{
    fn drop(&mut self) {
        self.follower.abort();
    }
}

impl<I, S> Inner<I, S>
where
    I: IdentityService + 'static,
    S: DocumentStore + 'static,
{
    /// Starts the session of `user`. Does nothing if it is already running.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn start_session(&self, user: &User) -> Result<(), ClientError> {
        let mut session = self.session.lock().await;
        if session.user.as_ref() == Some(&user.id) {
            return Ok(());
        }
        self.teardown(&mut session);

        if self.config.contacts.seed_sample_contacts {
            if let Err(e) = self.directory.ensure_sample_contacts(&user.id).await {
                warn!(error = %e.current_context(), "failed to seed sample contacts");
            }
        }

        let feed = self
            .directory
            .subscribe(user.id.clone(), self.config.contacts.refresh_interval())
            .await
            .map_err(lift)?;
        session.user = Some(user.id.clone());
        session.contacts = Some(feed);
        info!("session started");
        Ok(())
    }

    /// Ends the running session. Returns false if there was none.
    async fn end_session(&self) -> bool {
        let mut session = self.session.lock().await;
        let ended = session.user.is_some();
        self.teardown(&mut session);
        if ended {
            debug!("session ended");
        }
        ended
    }

    fn teardown(&self, session: &mut Session) {
        self.conversation.close();
        session.selection.clear();
        session.contacts = None;
        session.user = None;
    }

    /// Brings the session in line with what the identity service reports.
    async fn follow(&self, reported: Option<AuthUser>) {
        match reported {
            None => {
                if self.end_session().await {
                    info!("identity service signed out; session ended");
                }
            }
            Some(identity) => {
                let user = User::from_auth(&identity);
                if let Err(e) = self.start_session(&user).await {
                    warn!(
                        user_id = %user.id,
                        error = %e.current_context(),
                        "failed to start session for reported user"
                    );
                }
            }
        }
    }
}

/// Applies every identity change until the client is dropped.
async fn follow_identity<I, S>(
    inner: Weak<Inner<I, S>>,
    mut changes: watch::Receiver<Option<AuthUser>>,
) where
    I: IdentityService + 'static,
    S: DocumentStore + 'static,
{
    changes.mark_changed();
    while changes.changed().await.is_ok() {
        let reported = changes.borrow_and_update().clone();
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.follow(reported).await;
    }
}

enum Ownership {
    Own,
    Missing,
    Foreign,
}
