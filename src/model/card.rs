//! Card model for cardsync.
//!
//! A `Card` is the durable record of what was last synced for one board card.
//! Exactly one row exists per card id; rows are never deleted, so the mapping
//! from a card to any event it was once linked to stays available.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a card, derived from its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    /// No record has been written yet.
    Untracked,
    /// Open card without a linked calendar event.
    ActiveNoDue,
    /// Open card with a linked calendar event.
    ActiveWithEvent,
    /// Card closed upstream. Never has a linked event.
    Archived,
}

impl CardState {
    /// Get the string representation for display.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Untracked => "untracked",
            Self::ActiveNoDue => "active_no_due",
            Self::ActiveWithEvent => "active_with_event",
            Self::Archived => "archived",
        }
    }
}

/// Persisted state of a board card.
///
/// Invariants maintained by the reconciler:
/// - `event_id` is non-empty iff a live calendar event is believed to exist
/// - `archived == true` implies `event_id` is empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Card id from the board service (primary key)
    pub id: String,

    /// Display name, prefixed with the board initial (e.g. "[E] Ship release")
    pub name: String,

    /// Due date in the offset it was sent with; `None` means no due date is tracked
    pub due_at: Option<DateTime<FixedOffset>>,

    /// Deep link back to the card
    pub url: String,

    /// Owning board id
    pub board_id: String,

    /// Card was closed upstream
    #[serde(default)]
    pub archived: bool,

    /// Linked calendar event id; empty string when there is none
    #[serde(default)]
    pub event_id: String,

    /// Creation timestamp (Unix milliseconds, 0 until first saved)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds, 0 until first saved)
    pub updated_at: i64,
}

impl Card {
    /// A zero-value record for a card seen for the first time.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Whether a calendar event is linked to this card.
    #[must_use]
    pub fn has_event(&self) -> bool {
        !self.event_id.is_empty()
    }

    /// Whether this record has ever been persisted.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.created_at != 0
    }

    /// Derive the lifecycle state from the record fields.
    #[must_use]
    pub fn state(&self) -> CardState {
        if !self.is_persisted() {
            CardState::Untracked
        } else if self.archived {
            CardState::Archived
        } else if self.has_event() {
            CardState::ActiveWithEvent
        } else {
            CardState::ActiveNoDue
        }
    }

    /// Forget the linked event and the due date.
    pub fn clear_event(&mut self) {
        self.event_id.clear();
        self.due_at = None;
    }
}

/// One-character prefix derived from the board name; empty for an empty name.
#[must_use]
pub fn board_prefix(board_name: &str) -> String {
    board_name.chars().next().map(String::from).unwrap_or_default()
}

/// Display name used for the card and its event: `"[<prefix>] <name>"`.
#[must_use]
pub fn prefixed_name(board_name: &str, card_name: &str) -> String {
    format!("[{}] {}", board_prefix(board_name), card_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_card_is_zero_value() {
        let card = Card::new("abc123");

        assert_eq!(card.id, "abc123");
        assert!(card.name.is_empty());
        assert!(card.due_at.is_none());
        assert!(!card.archived);
        assert!(!card.has_event());
        assert_eq!(card.state(), CardState::Untracked);
    }

    #[test]
    fn test_state_derivation() {
        let mut card = Card::new("c1");
        card.created_at = 1;
        assert_eq!(card.state(), CardState::ActiveNoDue);

        card.event_id = "evt_1".to_string();
        assert_eq!(card.state(), CardState::ActiveWithEvent);

        card.event_id.clear();
        card.archived = true;
        assert_eq!(card.state(), CardState::Archived);
    }

    #[test]
    fn test_prefixed_name() {
        assert_eq!(prefixed_name("Eng", "Ship release"), "[E] Ship release");
        assert_eq!(prefixed_name("", "Ship release"), "[] Ship release");
        // Multi-byte initial stays whole
        assert_eq!(prefixed_name("Équipe", "Plan"), "[É] Plan");
    }

    #[test]
    fn test_clear_event() {
        let mut card = Card::new("c1");
        card.event_id = "evt_1".to_string();
        card.due_at = Some(chrono::Utc::now().fixed_offset());

        card.clear_event();

        assert!(!card.has_event());
        assert!(card.due_at.is_none());
    }
}
