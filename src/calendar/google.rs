//! Google Calendar implementation of [`Scheduler`].
//!
//! Talks to the Calendar v3 REST API with plain `reqwest`. Every request goes
//! through the client's [`RetryPolicy`].

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::auth::TokenSource;
use super::{CalendarEvent, Scheduler, all_day_span, event_description};
use crate::error::{Error, Result};
use crate::model::Card;
use crate::retry::{CallError, RetryPolicy, http_client};

/// Default API root.
pub const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

/// The part of an event response we need.
#[derive(Debug, Deserialize)]
struct EventRef {
    #[serde(default)]
    id: Option<String>,
}

/// Google Calendar client bound to one calendar.
#[derive(Debug)]
pub struct GoogleCalendar {
    http: reqwest::Client,
    base_url: String,
    calendar_id: String,
    tokens: TokenSource,
    retry: RetryPolicy,
}

impl GoogleCalendar {
    /// Create a client for the given calendar against the public API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(calendar_id: String, tokens: TokenSource) -> Result<Self> {
        Self::with_config(None, calendar_id, tokens, RetryPolicy::default())
    }

    /// Create a client with a custom API root (for testing) and retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_config(
        base_url: Option<String>,
        calendar_id: String,
        tokens: TokenSource,
        retry: RetryPolicy,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.unwrap_or_else(|| GOOGLE_CALENDAR_API.to_string()),
            calendar_id,
            tokens,
            retry,
        })
    }

    /// The calendar this client writes to.
    #[must_use]
    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    /// `.../calendars/{calendar_id}/events[/{event_id}]`, with segments escaped.
    fn events_url(&self, event_id: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid calendar API URL: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::Config("calendar API URL cannot be a base".to_string()))?;
            segments
                .pop_if_empty()
                .extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        Ok(url)
    }

    async fn token(&self) -> Result<String> {
        self.tokens.access_token(&self.http, &self.retry).await
    }

    /// Fetch the raw event resource.
    async fn get_event(&self, url: &Url, token: &str) -> Result<Value> {
        let event = self
            .retry
            .execute("get calendar event", || async {
                let response = self
                    .http
                    .get(url.clone())
                    .bearer_auth(token)
                    .send()
                    .await
                    .map_err(|e| CallError::from_send("get calendar event", &e))?;

                if !response.status().is_success() {
                    return Err(CallError::from_response("get calendar event", response).await);
                }

                response
                    .json::<Value>()
                    .await
                    .map_err(|e| CallError::decode("get calendar event", &e))
            })
            .await?;
        Ok(event)
    }
}

impl Scheduler for GoogleCalendar {
    async fn create_event(&self, card: &Card) -> Result<String> {
        let event = CalendarEvent::for_card(card)?;
        let url = self.events_url(None)?;
        let token = self.token().await?;

        let created = self
            .retry
            .execute("create calendar event", || async {
                let response = self
                    .http
                    .post(url.clone())
                    .bearer_auth(&token)
                    .json(&event)
                    .send()
                    .await
                    .map_err(|e| CallError::from_send("create calendar event", &e))?;

                if !response.status().is_success() {
                    return Err(CallError::from_response("create calendar event", response).await);
                }

                response
                    .json::<EventRef>()
                    .await
                    .map_err(|e| CallError::decode("create calendar event", &e))
            })
            .await?;

        let event_id = created.id.filter(|id| !id.is_empty()).ok_or_else(|| {
            Error::Other("calendar API returned an event without an id".to_string())
        })?;

        info!(card_id = %card.id, event_id = %event_id, "Created calendar event");
        Ok(event_id)
    }

    async fn update_event(&self, card: &Card, event_id: &str) -> Result<String> {
        let due = card.due_at.ok_or_else(|| Error::MissingDueDate {
            card_id: card.id.clone(),
        })?;
        let url = self.events_url(Some(event_id))?;
        let token = self.token().await?;

        // Keep whatever else is on the event (reminders, colour, attendees)
        let mut event = self.get_event(&url, &token).await?;
        let (start, end) = all_day_span(due);
        event["summary"] = Value::String(card.name.clone());
        event["description"] = Value::String(event_description(&card.url));
        event["start"] = serde_json::json!({ "date": start });
        event["end"] = serde_json::json!({ "date": end });

        let updated = self
            .retry
            .execute("update calendar event", || async {
                let response = self
                    .http
                    .put(url.clone())
                    .bearer_auth(&token)
                    .json(&event)
                    .send()
                    .await
                    .map_err(|e| CallError::from_send("update calendar event", &e))?;

                if !response.status().is_success() {
                    return Err(CallError::from_response("update calendar event", response).await);
                }

                response
                    .json::<EventRef>()
                    .await
                    .map_err(|e| CallError::decode("update calendar event", &e))
            })
            .await?;

        let updated_id = updated
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| event_id.to_string());

        info!(card_id = %card.id, event_id = %updated_id, "Updated calendar event");
        Ok(updated_id)
    }

    async fn delete_event(&self, event_id: &str) -> Result<()> {
        let url = self.events_url(Some(event_id))?;
        let token = self.token().await?;

        self.retry
            .execute("delete calendar event", || async {
                let response = self
                    .http
                    .delete(url.clone())
                    .bearer_auth(&token)
                    .send()
                    .await
                    .map_err(|e| CallError::from_send("delete calendar event", &e))?;

                let status = response.status();
                if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
                    debug!(event_id, %status, "Calendar event already deleted");
                    return Ok(());
                }
                if !status.is_success() {
                    return Err(CallError::from_response("delete calendar event", response).await);
                }
                Ok(())
            })
            .await?;

        info!(event_id, "Deleted calendar event");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        !self.calendar_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryError;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> GoogleCalendar {
        GoogleCalendar::with_config(
            Some(server.url()),
            "team@example.com".to_string(),
            TokenSource::fixed("tok".to_string()),
            RetryPolicy::immediate(3),
        )
        .unwrap()
    }

    fn card() -> Card {
        Card {
            id: "c1".to_string(),
            name: "[E] Ship release".to_string(),
            due_at: Some(Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap().fixed_offset()),
            url: "https://trello.com/c/AbC123".to_string(),
            board_id: "b1".to_string(),
            ..Card::default()
        }
    }

    #[test]
    fn test_events_url_escapes_calendar_id() {
        let calendar = GoogleCalendar::with_config(
            Some("https://example.test/calendar/v3/".to_string()),
            "team#holidays@group".to_string(),
            TokenSource::fixed("tok".to_string()),
            RetryPolicy::immediate(1),
        )
        .unwrap();

        let url = calendar.events_url(Some("evt_1")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/calendar/v3/calendars/team%23holidays@group/events/evt_1"
        );
    }

    #[tokio::test]
    async fn test_create_event_posts_all_day_event() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calendars/team@example.com/events")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "summary": "[E] Ship release",
                "description": "Trello Card: https://trello.com/c/AbC123",
                "start": { "date": "2025-03-10" },
                "end": { "date": "2025-03-11" },
            })))
            .with_status(200)
            .with_body(r#"{"id":"evt_42","summary":"[E] Ship release","start":{"date":"2025-03-10"},"end":{"date":"2025-03-11"}}"#)
            .create_async()
            .await;

        let event_id = client(&server).create_event(&card()).await.unwrap();

        assert_eq!(event_id, "evt_42");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_event_requires_due_date() {
        let server = mockito::Server::new_async().await;
        let mut undated = card();
        undated.due_at = None;

        let err = client(&server).create_event(&undated).await.unwrap_err();
        assert!(matches!(err, Error::MissingDueDate { .. }));
    }

    #[tokio::test]
    async fn test_create_event_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calendars/team@example.com/events")
            .with_status(503)
            .with_body("backend unavailable")
            .expect(3)
            .create_async()
            .await;

        let err = client(&server).create_event(&card()).await.unwrap_err();

        assert!(matches!(err, Error::Remote(RetryError::Exhausted { attempts: 3, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_event_undecodable_response_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calendars/team@example.com/events")
            .with_status(200)
            .with_body("not json")
            .expect(1)
            .create_async()
            .await;

        let err = client(&server).create_event(&card()).await.unwrap_err();

        assert!(matches!(err, Error::Remote(RetryError::Terminal(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_event_overwrites_fields_and_keeps_others() {
        let mut server = mockito::Server::new_async().await;
        let get = server
            .mock("GET", "/calendars/team@example.com/events/evt_1")
            .with_status(200)
            .with_body(r#"{"id":"evt_1","summary":"old","colorId":"5","start":{"date":"2025-01-01"},"end":{"date":"2025-01-02"}}"#)
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/calendars/team@example.com/events/evt_1")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "summary": "[E] Ship release",
                "colorId": "5",
                "start": { "date": "2025-03-10" },
                "end": { "date": "2025-03-11" },
            })))
            .with_status(200)
            .with_body(r#"{"id":"evt_1","summary":"[E] Ship release","start":{"date":"2025-03-10"},"end":{"date":"2025-03-11"}}"#)
            .create_async()
            .await;

        let event_id = client(&server).update_event(&card(), "evt_1").await.unwrap();

        assert_eq!(event_id, "evt_1");
        get.assert_async().await;
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_event_fetch_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let get = server
            .mock("GET", "/calendars/team@example.com/events/gone")
            .with_status(404)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/calendars/team@example.com/events")
            .expect(0)
            .create_async()
            .await;

        let err = client(&server).update_event(&card(), "gone").await.unwrap_err();

        assert!(matches!(err, Error::Remote(RetryError::Terminal(_))));
        get.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_event_not_found_is_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/calendars/team@example.com/events/evt_1")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        client(&server).delete_event("evt_1").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_event_gone_is_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/calendars/team@example.com/events/evt_1")
            .with_status(410)
            .create_async()
            .await;

        client(&server).delete_event("evt_1").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_event_forbidden_propagates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/calendars/team@example.com/events/evt_1")
            .with_status(403)
            .with_body("forbidden")
            .expect(1)
            .create_async()
            .await;

        let err = client(&server).delete_event("evt_1").await.unwrap_err();

        assert!(matches!(err, Error::Remote(RetryError::Terminal(msg)) if msg.contains("403")));
        mock.assert_async().await;
    }
}
