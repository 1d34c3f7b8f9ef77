//! The active conversation partner.

use pairchat_core::UserId;
use pairchat_identity::User;

/// Which contact, if any, is selected.
///
/// A plain value holder. Changing the selection has no side effects; the
/// caller decides what to open or close.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected: Option<User>,
}

impl SelectionState {
    /// Creates an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects `user`, returning the previous selection.
    pub fn select(&mut self, user: User) -> Option<User> {
        self.selected.replace(user)
    }

    /// Clears the selection, returning the previous one.
    pub fn clear(&mut self) -> Option<User> {
        self.selected.take()
    }

    #[must_use]
    pub fn current(&self) -> Option<&User> {
        self.selected.as_ref()
    }

    /// Returns true if `id` is the selected contact.
    #[must_use]
    pub fn is_selected(&self, id: &UserId) -> bool {
        self.selected.as_ref().is_some_and(|user| &user.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_replaces_and_clear_empties() {
        let mut selection = SelectionState::new();
        assert!(selection.current().is_none());

        let bob = User::new("b1", "Bob", "bob@x.io");
        let carol = User::new("c1", "Carol", "carol@x.io");
        assert!(selection.select(bob.clone()).is_none());
        assert_eq!(selection.select(carol.clone()), Some(bob));
        assert!(selection.is_selected(&carol.id));

        assert_eq!(selection.clear(), Some(carol));
        assert!(selection.current().is_none());
        assert!(selection.clear().is_none());
    }
}
