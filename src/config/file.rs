//! The optional `~/.cardsync/config.json` file.
//!
//! Every key is optional; environment variables and CLI flags override it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Board service section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrelloFileSettings {
    pub api_key: Option<String>,
    pub api_token: Option<String>,
    pub callback_url: Option<String>,
    #[serde(default)]
    pub board_ids: Vec<String>,
}

/// Calendar service section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleFileSettings {
    pub calendar_id: Option<String>,
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    /// Service-account key: the key object itself, its JSON text, or a path to the key file
    pub service_account: Option<serde_json::Value>,
}

/// Structure of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub db_path: Option<PathBuf>,
    pub server_port: Option<u16>,
    pub max_concurrent: Option<usize>,
    pub shutdown_timeout_secs: Option<u64>,
    #[serde(default)]
    pub trello: TrelloFileSettings,
    #[serde(default)]
    pub google: GoogleFileSettings,
}

/// Get the config file path.
fn config_path() -> Result<PathBuf> {
    super::global_cardsync_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load `~/.cardsync/config.json`; a missing file yields the defaults.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&config_path()?)
}

/// Load a config file from an explicit path; a missing file yields the defaults.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {e}", path.display())))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file {}: {e}", path.display())))
}
