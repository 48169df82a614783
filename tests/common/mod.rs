//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use cardsync::calendar::{CalendarEvent, Scheduler};
use cardsync::error::{Error, Result};
use cardsync::model::{Card, Notification, UPDATE_CARD};
use cardsync::reconcile::Reconciler;
use cardsync::retry::RetryError;
use cardsync::storage::{CardStore, SqliteStorage};

/// One call made against the fake calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(CalendarEvent),
    Update { event_id: String, event: CalendarEvent },
    Delete(String),
}

/// Scheduler double that records every call.
///
/// Created events get ids `evt_1`, `evt_2`, ... Failures are opt-in.
#[derive(Default)]
pub struct FakeCalendar {
    calls: Mutex<Vec<Call>>,
    fail_create: Mutex<Option<Error>>,
    fail_update: Mutex<Option<Error>>,
    delete_results: Mutex<VecDeque<Result<()>>>,
    next_id: Mutex<u32>,
}

impl FakeCalendar {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make the next create fail with `err`.
    pub fn fail_next_create(&self, err: Error) {
        *self.fail_create.lock().unwrap() = Some(err);
    }

    /// Make the next update fail with `err`.
    pub fn fail_next_update(&self, err: Error) {
        *self.fail_update.lock().unwrap() = Some(err);
    }

    /// Queue the result of the next delete (default `Ok(())`).
    pub fn push_delete_result(&self, result: Result<()>) {
        self.delete_results.lock().unwrap().push_back(result);
    }
}

impl Scheduler for FakeCalendar {
    async fn create_event(&self, card: &Card) -> Result<String> {
        let event = CalendarEvent::for_card(card)?;
        self.calls.lock().unwrap().push(Call::Create(event));
        if let Some(err) = self.fail_create.lock().unwrap().take() {
            return Err(err);
        }
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        Ok(format!("evt_{next}"))
    }

    async fn update_event(&self, card: &Card, event_id: &str) -> Result<String> {
        let event = CalendarEvent::for_card(card)?;
        self.calls.lock().unwrap().push(Call::Update {
            event_id: event_id.to_string(),
            event,
        });
        if let Some(err) = self.fail_update.lock().unwrap().take() {
            return Err(err);
        }
        Ok(event_id.to_string())
    }

    async fn delete_event(&self, event_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(event_id.to_string()));
        self.delete_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

/// Store whose writes always fail; reads delegate to an in-memory store.
pub struct FailingStore {
    pub inner: SqliteStorage,
}

impl CardStore for FailingStore {
    fn get_card(&self, id: &str) -> Result<Option<Card>> {
        self.inner.get_card(id)
    }

    fn upsert_card(&self, _card: &Card) -> Result<()> {
        Err(Error::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(5),
            Some("database is locked".to_string()),
        )))
    }

    fn ping(&self) -> Result<()> {
        self.inner.ping()
    }
}

pub fn reconciler() -> Reconciler<SqliteStorage, FakeCalendar> {
    Reconciler::new(SqliteStorage::open_memory().unwrap(), FakeCalendar::default())
}

/// A card update for `card_1` on board "Eng".
pub fn card_update(due: &str) -> Notification {
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

pub fn card_closed() -> Notification {
    Notification {
        closed: true,
        ..card_update("")
    }
}

pub fn remote_unavailable() -> Error {
    Error::Remote(RetryError::Exhausted {
        attempts: 3,
        last: "503 Service Unavailable".to_string(),
    })
}
