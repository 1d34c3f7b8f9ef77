//! The user record shared by identity and directory.

use pairchat_backend::{AuthUser, Document, DocumentStore, Fields, SERVER_TIMESTAMP, StoreError};
use pairchat_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// Collection holding one document per registered user, keyed by user id.
pub const USERS_COLLECTION: &str = "users";

/// A registered user as seen by other users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable user id.
    #[serde(rename = "uid")]
    pub id: UserId,
    /// Name shown in contact lists.
    pub display_name: String,
    /// Account email.
    pub email: String,
}

impl User {
    /// Creates a user record.
    #[must_use]
    pub fn new(
        id: impl Into<UserId>,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: email.into(),
        }
    }

    /// Builds the record for an authenticated identity.
    ///
    /// Accounts without a profile name are shown by the local part of
    /// their email.
    #[must_use]
    pub fn from_auth(identity: &AuthUser) -> Self {
        let display_name = identity
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(
                || {
                    identity
                        .email
                        .split('@')
                        .next()
                        .unwrap_or_default()
                        .to_string()
                },
                str::to_string,
            );
        Self {
            id: identity.uid.clone(),
            display_name,
            email: identity.email.clone(),
        }
    }

    /// Decodes a `users` document. Returns `None` for malformed records.
    #[must_use]
    pub fn from_document(document: &Document) -> Option<Self> {
        let mut user: Self = document.decode().ok()?;
        if user.id.as_str().is_empty() {
            user.id = UserId::new(document.id.clone());
        }
        Some(user)
    }

    /// Fields written when the record is first created.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("uid".to_string(), json!(self.id));
        fields.insert("displayName".to_string(), json!(self.display_name));
        fields.insert("email".to_string(), json!(self.email));
        fields.insert("createdAt".to_string(), Value::from(SERVER_TIMESTAMP));
        fields
    }
}

/// Creates the user's directory record, or refreshes its `lastLogin`.
///
/// # Errors
///
/// Returns the store error if the read or the write fails.
pub async fn upsert_user_record<S>(store: &S, user: &User) -> Result<(), StoreError>
where
    S: DocumentStore + ?Sized,
{
    let existing = store.get(USERS_COLLECTION, user.id.as_str()).await?;
    let fields = match existing {
        None => {
            let mut fields = user.to_fields();
            fields.insert("lastLogin".to_string(), Value::from(SERVER_TIMESTAMP));
            debug!(user_id = %user.id, "creating user record");
            fields
        }
        Some(_) => {
            let mut fields = Fields::new();
            fields.insert("lastLogin".to_string(), Value::from(SERVER_TIMESTAMP));
            debug!(user_id = %user.id, "refreshing user record");
            fields
        }
    };
    store.upsert(USERS_COLLECTION, user.id.as_str(), fields).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairchat_backend::MemoryDocumentStore;

    #[test]
    fn display_name_falls_back_to_email_local_part() {
        let user = User::from_auth(&AuthUser {
            uid: UserId::new("a1"),
            email: "alice@example.com".to_string(),
            display_name: None,
        });
        assert_eq!(user.display_name, "alice");

        let named = User::from_auth(&AuthUser {
            uid: UserId::new("a1"),
            email: "alice@example.com".to_string(),
            display_name: Some("Alice".to_string()),
        });
        assert_eq!(named.display_name, "Alice");
    }

    #[test]
    fn record_roundtrips_through_document() {
        let user = User::new("a1", "Alice", "alice@example.com");
        let document = Document::new("a1", user.to_fields());
        assert_eq!(User::from_document(&document), Some(user));
    }

    #[test]
    fn malformed_record_is_skipped() {
        let document = Document::new("x", json!({"uid": 7}).as_object().cloned().unwrap());
        assert!(User::from_document(&document).is_none());
    }

    #[tokio::test]
    async fn upsert_creates_then_only_touches_last_login() {
        let store = MemoryDocumentStore::new();
        let user = User::new("a1", "Alice", "alice@example.com");

        upsert_user_record(&store, &user).await.unwrap();
        let created = store.get(USERS_COLLECTION, "a1").await.unwrap().unwrap();
        let created_at = created.get("createdAt").cloned();
        assert!(created.get("lastLogin").is_some());

        let renamed = User::new("a1", "Someone Else", "alice@example.com");
        upsert_user_record(&store, &renamed).await.unwrap();

        let refreshed = store.get(USERS_COLLECTION, "a1").await.unwrap().unwrap();
        assert_eq!(refreshed.get_str("displayName"), Some("Alice"));
        assert_eq!(refreshed.get("createdAt").cloned(), created_at);
        assert_eq!(store.document_count(USERS_COLLECTION).await, 1);
    }
}
