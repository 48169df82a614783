//! Board webhook subscriptions.
//!
//! [`TrelloClient`] registers and deletes webhooks against the board service.
//! [`Subscriptions`] manages the whole set for the configured boards:
//!
//! - registering is all-or-nothing: if any board fails, the webhooks created so
//!   far are deleted again and the error is returned (startup must abort)
//! - deregistering continues past individual failures and reports each outcome

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::retry::{CallError, RetryPolicy, http_client};

/// Default API root of the board service.
pub const TRELLO_API: &str = "https://api.trello.com/1";

const WEBHOOK_DESCRIPTION: &str = "Webhook for Trello-GCal Sync";

/// Webhook registration primitives.
pub trait WebhookApi: Send + Sync {
    /// Register a webhook on a board; returns the webhook id.
    fn register_webhook(&self, board_id: &str) -> impl Future<Output = Result<String>> + Send;

    /// Delete a webhook by id.
    fn delete_webhook(&self, webhook_id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// A webhook as listed by the board service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookInfo {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub id_model: String,
    #[serde(default, rename = "callbackURL")]
    pub callback_url: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedWebhook {
    id: String,
}

/// HTTP client for the board service's webhook API.
pub struct TrelloClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_token: String,
    callback_url: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TrelloClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrelloClient")
            .field("base_url", &self.base_url)
            .field("callback_url", &self.callback_url)
            .finish_non_exhaustive()
    }
}

impl TrelloClient {
    /// Create a client against the public API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: String, api_token: String, callback_url: String) -> Result<Self> {
        Self::with_config(None, api_key, api_token, callback_url, RetryPolicy::default())
    }

    /// Create a client with a custom API root (for testing) and retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_config(
        base_url: Option<String>,
        api_key: String,
        api_token: String,
        callback_url: String,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let base_url = base_url.unwrap_or_else(|| TRELLO_API.to_string());
        Ok(Self {
            http: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_token,
            callback_url,
            retry,
        })
    }

    fn credentials(&self) -> [(&'static str, &str); 2] {
        [("key", self.api_key.as_str()), ("token", self.api_token.as_str())]
    }

    /// List the webhooks owned by the API token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn list_webhooks(&self) -> Result<Vec<WebhookInfo>> {
        let url = format!("{}/tokens/{}/webhooks", self.base_url, self.api_token);

        let webhooks = self
            .retry
            .execute("list webhooks", || async {
                let response = self
                    .http
                    .get(&url)
                    .query(&self.credentials())
                    .send()
                    .await
                    .map_err(|e| CallError::from_send("list webhooks", &e))?;

                if !response.status().is_success() {
                    return Err(CallError::from_response("list webhooks", response).await);
                }

                response
                    .json::<Vec<WebhookInfo>>()
                    .await
                    .map_err(|e| CallError::decode("list webhooks", &e))
            })
            .await?;

        Ok(webhooks)
    }
}

impl WebhookApi for TrelloClient {
    async fn register_webhook(&self, board_id: &str) -> Result<String> {
        let url = format!("{}/webhooks/", self.base_url);
        let form = [
            ("key", self.api_key.as_str()),
            ("token", self.api_token.as_str()),
            ("callbackURL", self.callback_url.as_str()),
            ("idModel", board_id),
            ("description", WEBHOOK_DESCRIPTION),
        ];

        let created = self
            .retry
            .execute("register webhook", || async {
                let response = self
                    .http
                    .post(&url)
                    .form(&form)
                    .send()
                    .await
                    .map_err(|e| CallError::from_send("register webhook", &e))?;

                if !response.status().is_success() {
                    return Err(CallError::from_response("register webhook", response).await);
                }

                response
                    .json::<CreatedWebhook>()
                    .await
                    .map_err(|e| CallError::decode("register webhook", &e))
            })
            .await?;

        info!(board_id, webhook_id = %created.id, "Registered webhook");
        Ok(created.id)
    }

    async fn delete_webhook(&self, webhook_id: &str) -> Result<()> {
        let url = format!("{}/webhooks/{webhook_id}", self.base_url);

        self.retry
            .execute("delete webhook", || async {
                let response = self
                    .http
                    .delete(&url)
                    .query(&self.credentials())
                    .send()
                    .await
                    .map_err(|e| CallError::from_send("delete webhook", &e))?;

                if !response.status().is_success() {
                    return Err(CallError::from_response("delete webhook", response).await);
                }
                Ok(())
            })
            .await?;

        info!(webhook_id, "Deleted webhook");
        Ok(())
    }
}

/// One registered webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub board_id: String,
    pub webhook_id: String,
}

/// Result of deregistering a subscription set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeregisterReport {
    /// Webhook ids that were deleted.
    pub deleted: Vec<String>,
    /// `(webhook_id, error)` for every webhook that could not be deleted.
    pub failed: Vec<(String, String)>,
}

impl DeregisterReport {
    /// Whether every webhook was deleted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The webhooks registered for the configured boards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    entries: Vec<Subscription>,
}

impl Subscriptions {
    /// Register one webhook per distinct board id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subscription`] for the first board that fails. Webhooks
    /// already registered by this call are deleted before returning.
    pub async fn register_all<W: WebhookApi>(api: &W, board_ids: &[String]) -> Result<Self> {
        let mut subscriptions = Self::default();

        for board_id in board_ids {
            if subscriptions.webhook_for(board_id).is_some() {
                continue;
            }

            match api.register_webhook(board_id).await {
                Ok(webhook_id) => subscriptions.entries.push(Subscription {
                    board_id: board_id.clone(),
                    webhook_id,
                }),
                Err(e) => {
                    error!(board_id = %board_id, error = %e, "Webhook registration failed");
                    if !subscriptions.is_empty() {
                        warn!(
                            count = subscriptions.len(),
                            "Rolling back webhooks registered before the failure"
                        );
                        subscriptions.deregister_all(api).await;
                    }
                    return Err(Error::Subscription {
                        board_id: board_id.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(subscriptions)
    }

    /// Delete every registered webhook, continuing past failures.
    ///
    /// The set is empty afterwards; webhooks that could not be deleted are
    /// listed in the report.
    pub async fn deregister_all<W: WebhookApi>(&mut self, api: &W) -> DeregisterReport {
        let mut report = DeregisterReport::default();

        for subscription in self.entries.drain(..) {
            match api.delete_webhook(&subscription.webhook_id).await {
                Ok(()) => {
                    info!(
                        board_id = %subscription.board_id,
                        webhook_id = %subscription.webhook_id,
                        "Webhook deregistered"
                    );
                    report.deleted.push(subscription.webhook_id);
                }
                Err(e) => {
                    error!(
                        board_id = %subscription.board_id,
                        webhook_id = %subscription.webhook_id,
                        error = %e,
                        "Failed to deregister webhook"
                    );
                    report.failed.push((subscription.webhook_id, e.to_string()));
                }
            }
        }

        report
    }

    /// Webhook id registered for a board.
    #[must_use]
    pub fn webhook_for(&self, board_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|s| s.board_id == board_id)
            .map(|s| s.webhook_id.as_str())
    }

    /// Iterate over the registered subscriptions.
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
