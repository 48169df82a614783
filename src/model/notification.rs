//! Decoded board notification.
//!
//! The webhook body is deeply nested on the wire; the transport flattens it
//! into a [`Notification`] before reconciliation (see `server::payload`).

use serde::{Deserialize, Serialize};

/// Action type of a card change. Every other action type is ignored.
pub const UPDATE_CARD: &str = "updateCard";

const CARD_URL_BASE: &str = "https://trello.com/c";

/// A single board change notification.
///
/// An empty `due` means the card has no due date; the board service sends an
/// empty value rather than omitting the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub action_type: String,
    pub card_id: String,
    pub card_name: String,
    pub due: String,
    pub short_link: String,
    pub closed: bool,
    pub board_id: String,
    pub board_name: String,
}

impl Notification {
    /// Whether this notification describes a card update.
    #[must_use]
    pub fn is_card_update(&self) -> bool {
        self.action_type == UPDATE_CARD
    }

    /// Whether the notification carries a due date.
    #[must_use]
    pub fn has_due(&self) -> bool {
        !self.due.trim().is_empty()
    }

    /// Deep link to the card.
    #[must_use]
    pub fn card_url(&self) -> String {
        format!("{CARD_URL_BASE}/{}", self.short_link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_update_detection() {
        let mut n = Notification {
            action_type: "updateCard".to_string(),
            ..Notification::default()
        };
        assert!(n.is_card_update());

        n.action_type = "commentCard".to_string();
        assert!(!n.is_card_update());
    }

    #[test]
    fn test_card_url() {
        let n = Notification {
            short_link: "AbC123".to_string(),
            ..Notification::default()
        };
        assert_eq!(n.card_url(), "https://trello.com/c/AbC123");
    }

    #[test]
    fn test_blank_due_counts_as_absent() {
        let mut n = Notification::default();
        assert!(!n.has_due());

        n.due = "  ".to_string();
        assert!(!n.has_due());

        n.due = "2025-03-10T00:00:00Z".to_string();
        assert!(n.has_due());
    }
}
