//! Reconciliation engine.
//!
//! Given a decoded [`Notification`] and the last persisted [`Card`], decide
//! which calendar calls to make and commit the resulting record.
//!
//! A pass either commits a record reflecting every intended effect, or aborts
//! without writing anything (due-date parse failure, failed create/update).
//! Calendar deletes are the exception: they are best-effort, and the record
//! is moved to a consistent "no event" state even when the delete failed.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calendar::Scheduler;
use crate::error::{Error, Result};
use crate::model::{Card, Notification, prefixed_name};
use crate::storage::CardStore;

/// What a reconciliation pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Outcome {
    /// Notification was not a card update or carried no card id. Nothing written.
    Ignored { reason: &'static str },
    /// Card closed; `removed_event` is the event that was unlinked, if any.
    Archived { removed_event: Option<String> },
    /// Event created (`created == true`) or updated for the card's due date.
    Synced { event_id: String, created: bool },
    /// Card has no due date; `removed_event` is the stray event unlinked, if any.
    Cleared { removed_event: Option<String> },
    /// Due date and event already in place; record refreshed only.
    Unchanged,
}

/// Applies notifications to the card store and the calendar.
///
/// Notifications for the *same* card id must not be processed concurrently:
/// each pass is a load, compute, upsert sequence with no per-card locking, so
/// two overlapping passes for one card race and the last upsert wins.
/// Different card ids may be processed in parallel.
#[derive(Debug)]
pub struct Reconciler<S, C> {
    store: S,
    calendar: C,
}

impl<S: CardStore, C: Scheduler> Reconciler<S, C> {
    pub const fn new(store: S, calendar: C) -> Self {
        Self { store, calendar }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn calendar(&self) -> &C {
        &self.calendar
    }

    /// Give back the store and calendar client (used to close the store on shutdown).
    pub fn into_parts(self) -> (S, C) {
        (self.store, self.calendar)
    }

    /// Run one reconciliation pass.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDueDate`] if the effective due date does not parse
    /// - the calendar error if creating or updating the event fails
    /// - the store error if loading or saving the record fails
    ///
    /// In the first two cases nothing is written.
    pub async fn process(&self, notification: &Notification) -> Result<Outcome> {
        if !notification.is_card_update() {
            debug!(action_type = %notification.action_type, "Ignoring notification");
            return Ok(Outcome::Ignored {
                reason: "not a card update",
            });
        }
        if notification.card_id.is_empty() {
            warn!("Card update without a card id");
            return Ok(Outcome::Ignored {
                reason: "missing card id",
            });
        }

        let card_id = notification.card_id.as_str();
        let mut card = match self.store.get_card(card_id)? {
            Some(card) => card,
            None => {
                debug!(card_id, "First notification for card");
                Card::new(card_id)
            }
        };

        if notification.closed {
            let removed_event = self.archive(&mut card).await;
            self.save(&mut card)?;
            info!(card_id, "Card archived");
            return Ok(Outcome::Archived { removed_event });
        }

        if card.archived {
            info!(card_id, "Card reopened");
            card.archived = false;
        }

        let outcome = if notification.has_due() {
            let due_at = parse_due(notification.due.trim())?;
            self.sync(&mut card, notification, due_at).await?
        } else {
            match (card.due_at, card.has_event()) {
                (Some(due_at), false) => {
                    info!(card_id, "Due date recorded without an event, recreating it");
                    self.sync(&mut card, notification, due_at).await?
                }
                (Some(_), true) => {
                    debug!(card_id, event_id = %card.event_id, "Event already linked");
                    Outcome::Unchanged
                }
                (None, _) => {
                    let removed_event = self.clear(&mut card).await;
                    Outcome::Cleared { removed_event }
                }
            }
        };

        self.save(&mut card)?;
        Ok(outcome)
    }

    /// Mark the card archived and unlink its event.
    async fn archive(&self, card: &mut Card) -> Option<String> {
        card.archived = true;
        let removed = self.unlink_event(card).await;
        card.event_id.clear();
        removed
    }

    /// Remove any linked event and forget the due date.
    async fn clear(&self, card: &mut Card) -> Option<String> {
        let removed = self.unlink_event(card).await;
        card.clear_event();
        removed
    }

    /// Best-effort delete of the linked event. Returns the id that was linked.
    async fn unlink_event(&self, card: &Card) -> Option<String> {
        if !card.has_event() {
            return None;
        }

        let event_id = card.event_id.clone();
        if let Err(e) = self.calendar.delete_event(&event_id).await {
            warn!(
                card_id = %card.id,
                event_id = %event_id,
                error = %e,
                "Failed to delete calendar event, unlinking anyway"
            );
        } else {
            info!(card_id = %card.id, event_id = %event_id, "Deleted calendar event");
        }
        Some(event_id)
    }

    /// Create or update the event for the effective due date.
    async fn sync(
        &self,
        card: &mut Card,
        notification: &Notification,
        due_at: DateTime<FixedOffset>,
    ) -> Result<Outcome> {
        let mut next = card.clone();
        next.id.clone_from(&notification.card_id);
        next.name = prefixed_name(&notification.board_name, &notification.card_name);
        next.due_at = Some(due_at);
        next.url = notification.card_url();
        next.board_id.clone_from(&notification.board_id);

        let created = !next.has_event();
        let event_id = if created {
            self.calendar.create_event(&next).await?
        } else {
            self.calendar.update_event(&next, &next.event_id).await?
        };

        info!(
            card_id = %next.id,
            event_id = %event_id,
            created,
            "Calendar event synced"
        );
        next.event_id.clone_from(&event_id);
        *card = next;
        Ok(Outcome::Synced { event_id, created })
    }

    fn save(&self, card: &mut Card) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        if card.created_at == 0 {
            card.created_at = now;
        }
        card.updated_at = now;
        self.store.upsert_card(card)
    }
}

/// Parse a due date as sent by the board service (RFC 3339).
///
/// The offset is kept: it decides which calendar day the event lands on.
///
/// # Errors
///
/// Returns [`Error::InvalidDueDate`] if the value is not an RFC 3339 timestamp.
pub fn parse_due(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| Error::InvalidDueDate {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UPDATE_CARD;
    use crate::storage::SqliteStorage;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Minimal calendar double; the full recording fake lives in `tests/common`.
    #[derive(Default)]
    struct StubCalendar {
        calls: Mutex<Vec<String>>,
    }

    impl Scheduler for StubCalendar {
        async fn create_event(&self, card: &Card) -> Result<String> {
            self.calls.lock().unwrap().push(format!("create {}", card.name));
            Ok("evt_new".to_string())
        }

        async fn update_event(&self, _card: &Card, event_id: &str) -> Result<String> {
            self.calls.lock().unwrap().push(format!("update {event_id}"));
            Ok(event_id.to_string())
        }

        async fn delete_event(&self, event_id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("delete {event_id}"));
            Ok(())
        }
    }

    fn notification(due: &str) -> Notification {
        Notification {
            action_type: UPDATE_CARD.to_string(),
            card_id: "card_1".to_string(),
            card_name: "Ship release".to_string(),
            due: due.to_string(),
            short_link: "AbC123".to_string(),
            closed: false,
            board_id: "board_1".to_string(),
            board_name: "Eng".to_string(),
        }
    }

    fn reconciler() -> Reconciler<SqliteStorage, StubCalendar> {
        Reconciler::new(SqliteStorage::open_memory().unwrap(), StubCalendar::default())
    }

    #[test]
    fn test_parse_due() {
        let parsed = parse_due("2025-03-10T00:00:00.000Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap());

        let offset = parse_due("2025-03-10T00:30:00+02:00").unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2025, 3, 9, 22, 30, 0).unwrap());
        assert_eq!(offset.offset().local_minus_utc(), 2 * 3600);

        assert!(matches!(
            parse_due("next tuesday"),
            Err(Error::InvalidDueDate { .. })
        ));
    }

    #[tokio::test]
    async fn test_other_action_types_are_ignored() {
        let reconciler = reconciler();
        let mut n = notification("2025-03-10T00:00:00Z");
        n.action_type = "commentCard".to_string();

        let outcome = reconciler.process(&n).await.unwrap();

        assert!(matches!(outcome, Outcome::Ignored { .. }));
        assert!(reconciler.store().get_card("card_1").unwrap().is_none());
        assert!(reconciler.calendar().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_card_id_is_ignored() {
        let reconciler = reconciler();
        let mut n = notification("2025-03-10T00:00:00Z");
        n.card_id.clear();

        let outcome = reconciler.process(&n).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Ignored {
                reason: "missing card id"
            }
        );
    }

    #[tokio::test]
    async fn test_first_sighting_creates_event_and_record() {
        let reconciler = reconciler();

        let outcome = reconciler
            .process(&notification("2025-03-10T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Synced {
                event_id: "evt_new".to_string(),
                created: true
            }
        );
        let card = reconciler.store().get_card("card_1").unwrap().unwrap();
        assert_eq!(card.name, "[E] Ship release");
        assert_eq!(card.url, "https://trello.com/c/AbC123");
        assert_eq!(card.event_id, "evt_new");
        assert!(card.created_at > 0);
        assert_eq!(
            *reconciler.calendar().calls.lock().unwrap(),
            vec!["create [E] Ship release".to_string()]
        );
    }

    #[tokio::test]
    async fn test_linked_event_is_updated() {
        let reconciler = reconciler();
        reconciler
            .process(&notification("2025-03-10T00:00:00Z"))
            .await
            .unwrap();

        let outcome = reconciler
            .process(&notification("2025-03-12T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Synced {
                event_id: "evt_new".to_string(),
                created: false
            }
        );
        let card = reconciler.store().get_card("card_1").unwrap().unwrap();
        assert_eq!(card.due_at.unwrap(), Utc.with_ymd_and_hms(2025, 3, 12, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_cleared_due_date_deletes_event() {
        let reconciler = reconciler();
        reconciler
            .process(&notification("2025-03-10T00:00:00Z"))
            .await
            .unwrap();
        // Drop the tracked due date so the empty-due notification reads as "cleared"
        let mut card = reconciler.store().get_card("card_1").unwrap().unwrap();
        card.due_at = None;
        reconciler.store().upsert_card(&card).unwrap();

        let outcome = reconciler.process(&notification("")).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Cleared {
                removed_event: Some("evt_new".to_string())
            }
        );
        let card = reconciler.store().get_card("card_1").unwrap().unwrap();
        assert!(card.event_id.is_empty());
        assert!(card.due_at.is_none());
    }

    #[tokio::test]
    async fn test_reopen_unarchives() {
        let reconciler = reconciler();
        let mut closed = notification("");
        closed.closed = true;
        reconciler.process(&closed).await.unwrap();
        assert!(reconciler.store().get_card("card_1").unwrap().unwrap().archived);

        reconciler
            .process(&notification("2025-03-10T00:00:00Z"))
            .await
            .unwrap();

        let card = reconciler.store().get_card("card_1").unwrap().unwrap();
        assert!(!card.archived);
        assert_eq!(card.event_id, "evt_new");
    }
}
