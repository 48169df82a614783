//! Error types for cardsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 5=remote, etc.)
//! - Retryability flags telling the webhook sender whether redelivery can help
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers and HTTP error bodies

use thiserror::Error;

use crate::retry::RetryError;

/// Result type alias for cardsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. HTTP consumers match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,

    // Not Found (exit 3)
    CardNotFound,

    // Validation (exit 4)
    InvalidDueDate,
    MissingDueDate,
    InvalidArgument,

    // Remote (exit 5)
    RemoteUnavailable,
    RemoteRejected,
    SubscriptionFailed,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::CardNotFound => "CARD_NOT_FOUND",
            Self::InvalidDueDate => "INVALID_DUE_DATE",
            Self::MissingDueDate => "MISSING_DUE_DATE",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::RemoteUnavailable => "REMOTE_UNAVAILABLE",
            Self::RemoteRejected => "REMOTE_REJECTED",
            Self::SubscriptionFailed => "SUBSCRIPTION_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError => 2,
            Self::CardNotFound => 3,
            Self::InvalidDueDate | Self::MissingDueDate | Self::InvalidArgument => 4,
            Self::RemoteUnavailable | Self::RemoteRejected | Self::SubscriptionFailed => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether redelivering the same notification could succeed.
    ///
    /// True when the failure was transient on our side or the remote side
    /// (exhausted retries, database contention). False for validation
    /// failures and for requests the remote service rejected outright.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable | Self::DatabaseError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in cardsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Card not found: {id}")]
    CardNotFound { id: String },

    #[error("Invalid due date '{value}': {reason}")]
    InvalidDueDate { value: String, reason: String },

    #[error("Card {card_id} has no due date")]
    MissingDueDate { card_id: String },

    #[error("Webhook registration failed for board {board_id}: {source}")]
    Subscription {
        board_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Remote call failed: {0}")]
    Remote(#[from] RetryError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::CardNotFound { .. } => ErrorCode::CardNotFound,
            Self::InvalidDueDate { .. } => ErrorCode::InvalidDueDate,
            Self::MissingDueDate { .. } => ErrorCode::MissingDueDate,
            Self::Subscription { .. } => ErrorCode::SubscriptionFailed,
            Self::Remote(RetryError::Exhausted { .. }) => ErrorCode::RemoteUnavailable,
            Self::Remote(RetryError::Terminal(_)) => ErrorCode::RemoteRejected,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Http(_) | Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for operators.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::CardNotFound { id } => Some(format!(
                "No record for card '{id}'. Cards are recorded on their first webhook; \
                 use `cardsync card list` to see tracked cards."
            )),

            Self::InvalidDueDate { .. } => Some(
                "Due dates must be RFC 3339 timestamps, e.g. 2025-03-10T00:00:00Z".to_string(),
            ),

            Self::Subscription { board_id, .. } => Some(format!(
                "Check TRELLO_API_KEY / TRELLO_API_TOKEN and that board '{board_id}' exists. \
                 The callback URL must be publicly reachable while registering."
            )),

            Self::Remote(RetryError::Exhausted { .. }) => Some(
                "The remote service kept failing; the board service will redeliver the webhook."
                    .to_string(),
            ),

            Self::Config(msg) => {
                if msg.contains("GOOGLE_") {
                    Some(
                        "Set GOOGLE_ACCESS_TOKEN, or GOOGLE_CLIENT_ID + GOOGLE_CLIENT_SECRET + \
                         GOOGLE_REFRESH_TOKEN, and GOOGLE_CALENDAR_ID"
                            .to_string(),
                    )
                } else if msg.contains("TRELLO_") {
                    Some(
                        "Set TRELLO_API_KEY, TRELLO_API_TOKEN, TRELLO_CALLBACK_URL and TRELLO_BOARD_ID, \
                         or add them to ~/.cardsync/config.json"
                            .to_string(),
                    )
                } else {
                    None
                }
            }

            Self::MissingDueDate { .. }
            | Self::Remote(RetryError::Terminal(_))
            | Self::Http(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
