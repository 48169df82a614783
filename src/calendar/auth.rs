//! Access tokens for the calendar API.
//!
//! Three ways to authenticate:
//! - a fixed bearer token
//! - an OAuth2 refresh token, exchanged for short-lived access tokens
//! - a service-account key, whose signed RS256 assertion is exchanged for
//!   short-lived access tokens
//!
//! Exchanged tokens are cached until shortly before they expire.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::retry::{CallError, RetryPolicy};

/// Google's OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scope requested for service-account tokens.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of a signed assertion; Google caps it at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// OAuth2 client credentials plus a long-lived refresh token.
#[derive(Clone)]
pub struct RefreshCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
}

/// The parts of a service-account JSON key needed to mint tokens.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl ServiceAccountKey {
    /// Parse the JSON key file contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is not a service-account key.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid service account key: {e}")))
    }

    /// Load a key from a setting holding either the JSON itself or a path to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or the key does not parse.
    pub fn load(setting: &str) -> Result<Self> {
        let setting = setting.trim();
        if setting.starts_with('{') {
            return Self::from_json(setting);
        }

        let path = Path::new(setting);
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read service account key {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Sign the JWT-bearer assertion for `key`, issued at `now`.
fn sign_assertion(
    key: &ServiceAccountKey,
    signer: &EncodingKey,
    now: DateTime<Utc>,
) -> jsonwebtoken::errors::Result<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid.clone_from(&key.private_key_id);

    let iat = now.timestamp();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: CALENDAR_SCOPE,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };
    jsonwebtoken::encode(&header, &claims, signer)
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(EXPIRY_BUFFER_SECS)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// How an access token is obtained from the token endpoint.
enum Grant {
    RefreshToken(RefreshCredentials),
    ServiceAccount {
        key: ServiceAccountKey,
        signer: EncodingKey,
    },
}

impl Grant {
    const fn operation(&self) -> &'static str {
        match self {
            Self::RefreshToken(_) => "refresh access token",
            Self::ServiceAccount { .. } => "exchange service account assertion",
        }
    }
}

enum Kind {
    Fixed(String),
    Exchanging {
        grant: Grant,
        cached: Mutex<Option<CachedToken>>,
    },
}

/// Source of bearer tokens for calendar requests.
pub struct TokenSource {
    kind: Kind,
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            Kind::Fixed(_) => "fixed",
            Kind::Exchanging {
                grant: Grant::RefreshToken(_),
                ..
            } => "refreshing",
            Kind::Exchanging {
                grant: Grant::ServiceAccount { .. },
                ..
            } => "service_account",
        };
        f.debug_struct("TokenSource").field("kind", &kind).finish()
    }
}

impl TokenSource {
    /// Always use the given access token.
    #[must_use]
    pub fn fixed(access_token: String) -> Self {
        Self {
            kind: Kind::Fixed(access_token),
        }
    }

    /// Exchange the refresh token for access tokens as needed.
    #[must_use]
    pub fn refreshing(credentials: RefreshCredentials) -> Self {
        Self::exchanging(Grant::RefreshToken(credentials))
    }

    /// Mint access tokens from a service-account key as needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the private key is not an RSA PEM key.
    pub fn service_account(key: ServiceAccountKey) -> Result<Self> {
        let signer = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid service account private key: {e}")))?;
        Ok(Self::exchanging(Grant::ServiceAccount { key, signer }))
    }

    fn exchanging(grant: Grant) -> Self {
        Self {
            kind: Kind::Exchanging {
                grant,
                cached: Mutex::new(None),
            },
        }
    }

    /// Get a valid access token, exchanging for a new one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint rejects the grant or keeps failing.
    pub async fn access_token(&self, http: &reqwest::Client, retry: &RetryPolicy) -> Result<String> {
        let (grant, cached) = match &self.kind {
            Kind::Fixed(token) => return Ok(token.clone()),
            Kind::Exchanging { grant, cached } => (grant, cached),
        };

        let mut cached = cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.access_token.clone());
        }

        let response = retry
            .execute(grant.operation(), || exchange(http, grant))
            .await?;

        let expires_in = response.expires_in.unwrap_or(3600);
        debug!(expires_in, grant = grant.operation(), "Obtained calendar access token");

        let token = CachedToken {
            access_token: response.access_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        };
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}

async fn exchange(
    http: &reqwest::Client,
    grant: &Grant,
) -> std::result::Result<TokenResponse, CallError> {
    let context = grant.operation();

    let (token_url, params) = match grant {
        Grant::RefreshToken(credentials) => (
            credentials.token_url.as_str(),
            vec![
                ("client_id", credentials.client_id.clone()),
                ("client_secret", credentials.client_secret.clone()),
                ("refresh_token", credentials.refresh_token.clone()),
                ("grant_type", "refresh_token".to_string()),
            ],
        ),
        Grant::ServiceAccount { key, signer } => {
            let assertion = sign_assertion(key, signer, Utc::now()).map_err(|e| {
                CallError::Terminal(format!("{context}: failed to sign assertion: {e}"))
            })?;
            (
                key.token_uri.as_str(),
                vec![
                    ("grant_type", JWT_BEARER_GRANT.to_string()),
                    ("assertion", assertion),
                ],
            )
        }
    };

    let response = http
        .post(token_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| CallError::from_send(context, &e))?;

    if !response.status().is_success() {
        return Err(CallError::from_response(context, response).await);
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| CallError::decode(context, &e))
}
