//! Configuration management.
//!
//! Settings are resolved once at startup and then passed explicitly to every
//! component. Priority for each setting:
//!
//! 1. CLI flag (see [`Overrides`])
//! 2. Environment variable
//! 3. `~/.cardsync/config.json`
//! 4. Built-in default
//!
//! Credentials have no default; commands that need them call the `require_*`
//! accessors, which fail with [`Error::Config`] naming the missing variable.

mod file;

pub use file::{ConfigFile, GoogleFileSettings, TrelloFileSettings, load_config, load_config_from};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::calendar::auth::{GOOGLE_TOKEN_URL, RefreshCredentials, ServiceAccountKey};
use crate::calendar::{GoogleCalendar, TokenSource};
use crate::error::{Error, Result};
use crate::trello::TrelloClient;

pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_MAX_CONCURRENT: usize = 8;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Get the global cardsync directory (`~/.cardsync/`).
#[must_use]
pub fn global_cardsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".cardsync"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `CARDSYNC_DB` environment variable
/// 3. `DB_PATH` environment variable
/// 4. Global location: `~/.cardsync/data/cards.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    resolve_db_path_with(explicit_path, None, &env_var)
}

fn resolve_db_path_with(
    explicit_path: Option<&Path>,
    file_path: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env("CARDSYNC_DB").or_else(|| env("DB_PATH")) {
        return Some(PathBuf::from(path));
    }

    if let Some(path) = file_path {
        return Some(path.to_path_buf());
    }

    global_cardsync_dir().map(|dir| dir.join("data").join("cards.db"))
}

/// Non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db_path: Option<PathBuf>,
    pub server_port: Option<u16>,
    pub callback_url: Option<String>,
    pub board_ids: Vec<String>,
    pub max_concurrent: Option<usize>,
}

/// Board service credentials and tracked boards.
#[derive(Clone, Default)]
pub struct TrelloSettings {
    pub api_key: Option<String>,
    pub api_token: Option<String>,
    pub callback_url: Option<String>,
    pub board_ids: Vec<String>,
}

impl std::fmt::Debug for TrelloSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrelloSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .field("api_token", &self.api_token.as_ref().map(|_| "<set>"))
            .field("callback_url", &self.callback_url)
            .field("board_ids", &self.board_ids)
            .finish()
    }
}

impl TrelloSettings {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `TRELLO_CALLBACK_URL` is not configured.
    pub fn require_callback_url(&self) -> Result<&str> {
        self.callback_url
            .as_deref()
            .ok_or_else(|| missing("TRELLO_CALLBACK_URL"))
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] if no board is configured.
    pub fn require_boards(&self) -> Result<&[String]> {
        if self.board_ids.is_empty() {
            return Err(missing("TRELLO_BOARD_ID"));
        }
        Ok(&self.board_ids)
    }

    /// Build the webhook client. The callback URL may be empty for commands
    /// that never register webhooks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key or token is missing.
    pub fn client(&self) -> Result<TrelloClient> {
        let api_key = self.api_key.clone().ok_or_else(|| missing("TRELLO_API_KEY"))?;
        let api_token = self
            .api_token
            .clone()
            .ok_or_else(|| missing("TRELLO_API_TOKEN"))?;
        TrelloClient::new(
            api_key,
            api_token,
            self.callback_url.clone().unwrap_or_default(),
        )
    }
}

/// Calendar id and credentials.
#[derive(Clone, Default)]
pub struct GoogleSettings {
    pub calendar_id: Option<String>,
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    /// Service-account key JSON, or a path to the key file
    pub service_account: Option<String>,
}

impl std::fmt::Debug for GoogleSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSettings")
            .field("calendar_id", &self.calendar_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "<set>"))
            .field("client_id", &self.client_id)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<set>"))
            .field("service_account", &self.service_account.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

impl GoogleSettings {
    /// Token source, first configured of: static access token, service-account
    /// key, refresh credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if none is fully configured or the
    /// service-account key is unusable.
    pub fn token_source(&self) -> Result<TokenSource> {
        if let Some(token) = &self.access_token {
            return Ok(TokenSource::fixed(token.clone()));
        }
        if let Some(setting) = &self.service_account {
            return TokenSource::service_account(ServiceAccountKey::load(setting)?);
        }

        match (&self.client_id, &self.client_secret, &self.refresh_token) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => {
                Ok(TokenSource::refreshing(RefreshCredentials {
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    refresh_token: refresh_token.clone(),
                    token_url: GOOGLE_TOKEN_URL.to_string(),
                }))
            }
            _ => Err(Error::Config(
                "GOOGLE_ACCESS_TOKEN, GOOGLE_SERVICE_ACCOUNT_JSON or GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET/GOOGLE_REFRESH_TOKEN must be set"
                    .to_string(),
            )),
        }
    }

    /// Build the calendar client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the calendar id or credentials are missing.
    pub fn client(&self) -> Result<GoogleCalendar> {
        let calendar_id = self
            .calendar_id
            .clone()
            .ok_or_else(|| missing("GOOGLE_CALENDAR_ID"))?;
        GoogleCalendar::new(calendar_id, self.token_source()?)
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub server_port: u16,
    pub max_concurrent: usize,
    pub shutdown_timeout: Duration,
    pub trello: TrelloSettings,
    pub google: GoogleSettings,
}

impl Settings {
    /// Resolve settings from flags, the process environment and `config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the config file is unreadable or a numeric
    /// environment variable does not parse.
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        let file = load_config()?;
        Self::resolve_with(overrides, file, &env_var)
    }

    /// Resolve settings with an explicit config file and environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a numeric variable does not parse or no
    /// database location can be determined.
    pub fn resolve_with(
        overrides: Overrides,
        file: ConfigFile,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let db_path = resolve_db_path_with(overrides.db_path.as_deref(), file.db_path.as_deref(), env)
            .ok_or_else(|| Error::Config("Could not determine database path".into()))?;

        let server_port = match overrides.server_port {
            Some(port) => port,
            None => parse_env(env, "SERVER_PORT")?
                .or(file.server_port)
                .unwrap_or(DEFAULT_SERVER_PORT),
        };

        let max_concurrent = match overrides.max_concurrent {
            Some(n) => n,
            None => parse_env(env, "CARDSYNC_MAX_CONCURRENT")?
                .or(file.max_concurrent)
                .unwrap_or(DEFAULT_MAX_CONCURRENT),
        };

        let shutdown_timeout_secs = parse_env(env, "CARDSYNC_SHUTDOWN_TIMEOUT_SECS")?
            .or(file.shutdown_timeout_secs)
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS);

        let board_ids = if overrides.board_ids.is_empty() {
            env("TRELLO_BOARD_ID")
                .map(|ids| split_list(&ids))
                .unwrap_or(file.trello.board_ids)
        } else {
            overrides.board_ids
        };

        let trello = TrelloSettings {
            api_key: env("TRELLO_API_KEY").or(file.trello.api_key),
            api_token: env("TRELLO_API_TOKEN").or(file.trello.api_token),
            callback_url: overrides
                .callback_url
                .or_else(|| env("TRELLO_CALLBACK_URL"))
                .or(file.trello.callback_url),
            board_ids,
        };

        let google = GoogleSettings {
            calendar_id: env("GOOGLE_CALENDAR_ID").or(file.google.calendar_id),
            access_token: env("GOOGLE_ACCESS_TOKEN").or(file.google.access_token),
            client_id: env("GOOGLE_CLIENT_ID").or(file.google.client_id),
            client_secret: env("GOOGLE_CLIENT_SECRET").or(file.google.client_secret),
            refresh_token: env("GOOGLE_REFRESH_TOKEN").or(file.google.refresh_token),
            service_account: env("GOOGLE_SERVICE_ACCOUNT_JSON")
                .or_else(|| file.google.service_account.and_then(json_setting)),
        };

        Ok(Self {
            db_path,
            server_port,
            max_concurrent: max_concurrent.max(1),
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
            trello,
            google,
        })
    }
}

/// A JSON config value read as a string setting; objects keep their JSON text.
fn json_setting(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn missing(var: &str) -> Error {
    Error::Config(format!("{var} is not set"))
}

fn parse_env<T: std::str::FromStr>(
    env: &dyn Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    env(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}")))
        })
        .transpose()
}

/// Split a comma separated list, dropping blanks.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/cards.db");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_db_path_env_priority() {
        let env = env_from(&[("DB_PATH", "/legacy.db"), ("CARDSYNC_DB", "/primary.db")]);
        let path = resolve_db_path_with(None, Some(Path::new("/file.db")), &env);
        assert_eq!(path, Some(PathBuf::from("/primary.db")));

        let env = env_from(&[("DB_PATH", "/legacy.db")]);
        let path = resolve_db_path_with(None, Some(Path::new("/file.db")), &env);
        assert_eq!(path, Some(PathBuf::from("/legacy.db")));

        let path = resolve_db_path_with(None, Some(Path::new("/file.db")), &env_from(&[]));
        assert_eq!(path, Some(PathBuf::from("/file.db")));
    }

    #[test]
    fn test_defaults() {
        let settings =
            Settings::resolve_with(Overrides::default(), ConfigFile::default(), &env_from(&[]))
                .unwrap();

        assert_eq!(settings.server_port, DEFAULT_SERVER_PORT);
        assert_eq!(settings.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(10));
        assert!(settings.db_path.ends_with("cards.db"));
        assert!(settings.trello.board_ids.is_empty());
    }

    #[test]
    fn test_priority_flag_env_file() {
        let file = ConfigFile {
            server_port: Some(7000),
            trello: TrelloFileSettings {
                api_key: Some("file-key".into()),
                callback_url: Some("https://file/cb".into()),
                board_ids: vec!["file_board".into()],
                ..TrelloFileSettings::default()
            },
            ..ConfigFile::default()
        };
        let env = env_from(&[
            ("SERVER_PORT", "7100"),
            ("TRELLO_API_KEY", "env-key"),
            ("TRELLO_BOARD_ID", "b1, b2,,"),
        ]);
        let overrides = Overrides {
            callback_url: Some("https://flag/cb".into()),
            ..Overrides::default()
        };

        let settings = Settings::resolve_with(overrides, file, &env).unwrap();

        assert_eq!(settings.server_port, 7100);
        assert_eq!(settings.trello.api_key.as_deref(), Some("env-key"));
        assert_eq!(settings.trello.callback_url.as_deref(), Some("https://flag/cb"));
        assert_eq!(settings.trello.board_ids, vec!["b1", "b2"]);
    }

    #[test]
    fn test_board_flags_win() {
        let env = env_from(&[("TRELLO_BOARD_ID", "env_board")]);
        let overrides = Overrides {
            board_ids: vec!["flag_board".into()],
            ..Overrides::default()
        };

        let settings = Settings::resolve_with(overrides, ConfigFile::default(), &env).unwrap();

        assert_eq!(settings.trello.require_boards().unwrap(), ["flag_board".to_string()]);
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let env = env_from(&[("SERVER_PORT", "eighty")]);
        let err = Settings::resolve_with(Overrides::default(), ConfigFile::default(), &env)
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("SERVER_PORT")));
    }

    #[test]
    fn test_required_settings_name_the_variable() {
        let settings =
            Settings::resolve_with(Overrides::default(), ConfigFile::default(), &env_from(&[]))
                .unwrap();

        let err = settings.trello.client().unwrap_err();
        assert!(err.to_string().contains("TRELLO_API_KEY"));

        let err = settings.trello.require_boards().unwrap_err();
        assert!(err.to_string().contains("TRELLO_BOARD_ID"));

        let err = settings.google.client().unwrap_err();
        assert!(err.to_string().contains("GOOGLE_CALENDAR_ID"));
    }

    #[test]
    fn test_google_token_source_selection() {
        let google = GoogleSettings {
            calendar_id: Some("primary".into()),
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            ..GoogleSettings::default()
        };
        assert!(matches!(google.token_source(), Err(Error::Config(_))));

        let google = GoogleSettings {
            refresh_token: Some("refresh".into()),
            ..google
        };
        assert!(format!("{:?}", google.token_source().unwrap()).contains("refreshing"));

        let google = GoogleSettings {
            access_token: Some("static".into()),
            ..google
        };
        assert!(format!("{:?}", google.token_source().unwrap()).contains("fixed"));
        assert_eq!(google.client().unwrap().calendar_id(), "primary");
    }

    #[test]
    fn test_service_account_from_config_file() {
        let key = serde_json::json!({
            "type": "service_account",
            "client_email": "cardsync@project.iam.gserviceaccount.com",
            "private_key": include_str!("../calendar/testdata/service_account_key.pem"),
        });
        let file = ConfigFile {
            google: GoogleFileSettings {
                calendar_id: Some("primary".into()),
                refresh_token: Some("refresh".into()),
                client_id: Some("id".into()),
                client_secret: Some("secret".into()),
                service_account: Some(key),
                ..GoogleFileSettings::default()
            },
            ..ConfigFile::default()
        };

        let settings =
            Settings::resolve_with(Overrides::default(), file, &env_from(&[])).unwrap();

        // Service account wins over refresh credentials
        let source = settings.google.token_source().unwrap();
        assert!(format!("{source:?}").contains("service_account"));
        assert!(!format!("{:?}", settings.google).contains("PRIVATE KEY"));
    }

    #[test]
    fn test_unusable_service_account_is_config_error() {
        let env = env_from(&[("GOOGLE_SERVICE_ACCOUNT_JSON", "/nonexistent/key.json")]);
        let settings =
            Settings::resolve_with(Overrides::default(), ConfigFile::default(), &env).unwrap();

        assert!(matches!(settings.google.token_source(), Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let trello = TrelloSettings {
            api_key: Some("k-secret".into()),
            api_token: Some("t-secret".into()),
            ..TrelloSettings::default()
        };
        let rendered = format!("{trello:?}");
        assert!(!rendered.contains("k-secret"));
        assert!(!rendered.contains("t-secret"));
    }
}
