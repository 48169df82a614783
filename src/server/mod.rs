//! Webhook transport.
//!
//! - `POST /api/trello-webhook`: decode the delivery and reconcile it
//! - `HEAD` (or any other verb) on the same path: `200`, used by the board
//!   service to validate the callback URL
//! - `GET /healthz`: store reachability and calendar client readiness
//!
//! Deliveries are processed on the request task, bounded by a [`WorkerPool`].

pub mod payload;
pub mod pool;

pub use payload::WebhookPayload;
pub use pool::WorkerPool;

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::calendar::Scheduler;
use crate::model::Notification;
use crate::reconcile::Reconciler;
use crate::storage::CardStore;

/// Path the board service posts deliveries to.
pub const WEBHOOK_PATH: &str = "/api/trello-webhook";

/// Path of the health check.
pub const HEALTH_PATH: &str = "/healthz";

const PROCESSED_MESSAGE: &str = "Event processed successfully";

/// Shared state of the webhook router.
#[derive(Debug)]
pub struct AppState<S, C> {
    pub reconciler: Arc<Reconciler<S, C>>,
    pub pool: WorkerPool,
}

impl<S, C> AppState<S, C> {
    pub const fn new(reconciler: Arc<Reconciler<S, C>>, pool: WorkerPool) -> Self {
        Self { reconciler, pool }
    }
}

/// Build the webhook router.
pub fn router<S, C>(state: Arc<AppState<S, C>>) -> Router
where
    S: CardStore + 'static,
    C: Scheduler + 'static,
{
    Router::new()
        .route(
            WEBHOOK_PATH,
            post(handle_webhook::<S, C>).fallback(acknowledge),
        )
        .route(HEALTH_PATH, get(health::<S, C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn acknowledge() -> StatusCode {
    StatusCode::OK
}

async fn handle_webhook<S, C>(State(state): State<Arc<AppState<S, C>>>, body: Bytes) -> Response
where
    S: CardStore + 'static,
    C: Scheduler + 'static,
{
    // Webhook creation sends an empty validation body
    if body.iter().all(u8::is_ascii_whitespace) {
        return StatusCode::OK.into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "Ignoring undecodable webhook body");
            return StatusCode::OK.into_response();
        }
    };
    let notification = Notification::from(payload);

    let Some(_permit) = state.pool.acquire().await else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": { "code": "SHUTTING_DOWN", "message": "server is shutting down" } })),
        )
            .into_response();
    };

    match state.reconciler.process(&notification).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "message": PROCESSED_MESSAGE, "outcome": outcome })),
        )
            .into_response(),
        Err(e) => {
            error!(
                card_id = %notification.card_id,
                code = e.error_code().as_str(),
                error = %e,
                "Failed to process webhook"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(e.to_structured_json())).into_response()
        }
    }
}

async fn health<S, C>(State(state): State<Arc<AppState<S, C>>>) -> Response
where
    S: CardStore + 'static,
    C: Scheduler + 'static,
{
    if let Err(e) = state.reconciler.store().ping() {
        error!(error = %e, "Health check: store unreachable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "check": "store", "error": e.to_string() })),
        )
            .into_response();
    }

    if !state.reconciler.calendar().is_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "check": "calendar" })),
        )
            .into_response();
    }

    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}
