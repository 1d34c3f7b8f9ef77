//! Message types for conversations.

use chrono::{DateTime, Utc};
use pairchat_backend::{Document, Fields, SERVER_TIMESTAMP};
use pairchat_core::{MessageId, UserId};
use serde::Deserialize;
use serde_json::{Value, json};

/// Collection holding every message of every conversation.
pub const MESSAGES_COLLECTION: &str = "messages";

/// Unordered pair of user ids identifying a one-to-one conversation.
///
/// `ConversationKey::new(a, b) == ConversationKey::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    low: UserId,
    high: UserId,
}

impl ConversationKey {
    /// Creates the key for the conversation between `a` and `b`.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }
}

/// A message between two users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Store-assigned id.
    pub id: MessageId,
    /// Message body.
    pub text: String,
    /// Author.
    pub sender_id: UserId,
    /// Recipient.
    pub receiver_id: UserId,
    /// Always `[sender_id, receiver_id]`.
    pub participants: [UserId; 2],
    /// Write time assigned by the store.
    pub timestamp: DateTime<Utc>,
    /// Set once the text has been changed.
    pub edited: bool,
}

/// Stored shape of a message; the id is the document key.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRecord {
    text: String,
    sender_id: UserId,
    receiver_id: UserId,
    participants: [UserId; 2],
    #[serde(with = "chrono::serde::ts_microseconds")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    edited: bool,
}

impl Message {
    /// Decodes a `messages` document. Returns `None` for malformed records.
    #[must_use]
    pub fn from_document(document: &Document) -> Option<Self> {
        let record: MessageRecord = document.decode().ok()?;
        Some(Self {
            id: MessageId::new(document.id.clone()),
            text: record.text,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            participants: record.participants,
            timestamp: record.timestamp,
            edited: record.edited,
        })
    }

    /// The conversation this message belongs to.
    #[must_use]
    pub fn key(&self) -> ConversationKey {
        let [a, b] = self.participants.clone();
        ConversationKey::new(a, b)
    }

    /// Returns true if the message belongs to `key`.
    #[must_use]
    pub fn belongs_to(&self, key: &ConversationKey) -> bool {
        &self.key() == key
    }

    /// Fields for a new message. The store stamps the timestamp.
    #[must_use]
    pub fn new_fields(text: &str, sender: &UserId, receiver: &UserId) -> Fields {
        let mut fields = Fields::new();
        fields.insert("text".to_string(), json!(text));
        fields.insert("senderId".to_string(), json!(sender));
        fields.insert("receiverId".to_string(), json!(receiver));
        fields.insert("participants".to_string(), json!([sender, receiver]));
        fields.insert("timestamp".to_string(), Value::from(SERVER_TIMESTAMP));
        fields.insert("edited".to_string(), Value::Bool(false));
        fields
    }

    /// Fields merged into a message by an edit.
    #[must_use]
    pub fn edit_fields(text: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("text".to_string(), json!(text));
        fields.insert("edited".to_string(), Value::Bool(true));
        fields
    }
}

/// Sorts messages by timestamp, then by id.
///
/// Store ids sort in creation order, so equal timestamps keep insertion
/// order.
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str, sender: &str, receiver: &str, micros: i64) -> Document {
        let fields = json!({
            "text": format!("from {sender}"),
            "senderId": sender,
            "receiverId": receiver,
            "participants": [sender, receiver],
            "timestamp": micros,
            "edited": false,
        });
        Document::new(id, fields.as_object().cloned().unwrap())
    }

    #[test]
    fn key_is_unordered() {
        let ab = ConversationKey::new(UserId::new("a1"), UserId::new("b1"));
        let ba = ConversationKey::new(UserId::new("b1"), UserId::new("a1"));
        assert_eq!(ab, ba);
        assert_ne!(ab, ConversationKey::new(UserId::new("a1"), UserId::new("c1")));
    }

    #[test]
    fn decodes_stored_message() {
        let message = Message::from_document(&document("m1", "a1", "b1", 1_000)).unwrap();

        assert_eq!(message.id, MessageId::new("m1"));
        assert_eq!(message.sender_id, UserId::new("a1"));
        assert_eq!(message.timestamp.timestamp_micros(), 1_000);
        assert!(message.belongs_to(&ConversationKey::new(
            UserId::new("b1"),
            UserId::new("a1")
        )));
    }

    #[test]
    fn unresolved_timestamp_is_malformed() {
        let mut doc = document("m1", "a1", "b1", 0);
        doc.fields
            .insert("timestamp".to_string(), Value::from(SERVER_TIMESTAMP));
        assert!(Message::from_document(&doc).is_none());
    }

    #[test]
    fn missing_edited_flag_defaults_to_false() {
        let mut doc = document("m1", "a1", "b1", 0);
        doc.fields.remove("edited");
        assert!(!Message::from_document(&doc).unwrap().edited);
    }

    #[test]
    fn equal_timestamps_fall_back_to_id_order() {
        let mut messages: Vec<Message> = [
            document("03", "a1", "b1", 5),
            document("01", "b1", "a1", 5),
            document("02", "a1", "b1", 1),
        ]
        .iter()
        .filter_map(Message::from_document)
        .collect();

        sort_messages(&mut messages);

        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["02", "01", "03"]);
    }
}
