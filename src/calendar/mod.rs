//! Scheduling client: calendar events mirroring card due dates.
//!
//! The reconciler decides *which* of the three primitives to call; the
//! [`Scheduler`] implementation performs it. Every event is an all-day event
//! from the due date to the following day (end-exclusive).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  Reconciler  │
//! └──────┬───────┘
//!        │ create / update / delete
//!        ▼
//! ┌──────────────┐     ┌──────────────┐
//! │GoogleCalendar│────▶│ TokenSource  │  static token or refresh token
//! └──────┬───────┘     └──────────────┘
//!        │ RetryPolicy::execute
//!        ▼
//!   HTTP calendar API
//! ```

pub mod auth;
pub mod google;

pub use auth::TokenSource;
pub use google::GoogleCalendar;

use std::future::Future;

use chrono::{DateTime, Days, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Card;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar operations used by the reconciler.
///
/// Uses async methods for HTTP-based implementations.
pub trait Scheduler: Send + Sync {
    /// Create an all-day event for the card's due date and return its id.
    ///
    /// Fails with [`Error::MissingDueDate`] when the card has no due date.
    fn create_event(&self, card: &Card) -> impl Future<Output = Result<String>> + Send;

    /// Overwrite summary, description and dates of an existing event.
    ///
    /// The event is fetched first; a failed fetch is an error (no fallback
    /// to creating a new event). Returns the event id.
    fn update_event(
        &self,
        card: &Card,
        event_id: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Delete an event. An event that no longer exists counts as deleted.
    fn delete_event(&self, event_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Whether the client is configured and ready to make calls.
    fn is_ready(&self) -> bool {
        true
    }
}

/// All-day date as used by the calendar API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDate {
    /// `YYYY-MM-DD`
    pub date: String,
}

/// Calendar event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub start: EventDate,
    pub end: EventDate,
}

impl CalendarEvent {
    /// Build the event body for a card.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDueDate`] if the card has no due date.
    pub fn for_card(card: &Card) -> Result<Self> {
        let due = card.due_at.ok_or_else(|| Error::MissingDueDate {
            card_id: card.id.clone(),
        })?;
        let (start, end) = all_day_span(due);

        Ok(Self {
            id: None,
            summary: card.name.clone(),
            description: event_description(&card.url),
            start: EventDate { date: start },
            end: EventDate { date: end },
        })
    }
}

/// Start and end dates for an all-day event on the due date.
///
/// The day is taken in the due date's own offset, not UTC. The end date is
/// exclusive, so it is the day after the due date.
#[must_use]
pub fn all_day_span(due: DateTime<FixedOffset>) -> (String, String) {
    let day = due.date_naive();
    let next = day.checked_add_days(Days::new(1)).unwrap_or(day);
    (
        day.format(DATE_FORMAT).to_string(),
        next.format(DATE_FORMAT).to_string(),
    )
}

/// Event description linking back to the card.
#[must_use]
pub fn event_description(card_url: &str) -> String {
    format!("Trello Card: {card_url}")
}
