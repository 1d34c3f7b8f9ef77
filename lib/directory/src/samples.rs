//! Placeholder contacts for demo sessions.

use pairchat_identity::User;

/// The fixed placeholder contacts, keyed by stable ids.
#[must_use]
pub fn sample_contacts() -> Vec<User> {
    [
        ("sample_user_1", "Alice Johnson", "alice@example.com"),
        ("sample_user_2", "Bob Smith", "bob@example.com"),
        ("sample_user_3", "Carol Davis", "carol@example.com"),
        ("sample_user_4", "David Wilson", "david@example.com"),
        ("sample_user_5", "Eva Brown", "eva@example.com"),
    ]
    .into_iter()
    .map(|(id, name, email)| User::new(id, name, email))
    .collect()
}
