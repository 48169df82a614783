//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Overrides;

pub mod commands;

/// cardsync - mirror board card due dates into a calendar
#[derive(Parser, Debug)]
#[command(name = "cardsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.cardsync/data/cards.db)
    #[arg(long, global = true, env = "CARDSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    /// Settings overrides carried by global flags.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            db_path: self.db.clone(),
            ..Overrides::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the webhook server and keep calendar events in sync
    Serve(ServeArgs),

    /// Manage board webhooks by hand
    Webhook {
        #[command(subcommand)]
        command: WebhookCommands,
    },

    /// Inspect synced card records
    Card {
        #[command(subcommand)]
        command: CardCommands,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Serve
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port to listen on (default: 8080)
    #[arg(long)]
    pub port: Option<u16>,

    /// Public URL the board service posts webhooks to
    #[arg(long)]
    pub callback_url: Option<String>,

    /// Board to subscribe to (repeatable; default: TRELLO_BOARD_ID)
    #[arg(long = "board", value_name = "BOARD_ID")]
    pub boards: Vec<String>,

    /// Maximum webhooks processed concurrently (default: 8)
    #[arg(long)]
    pub max_concurrent: Option<usize>,
}

impl ServeArgs {
    /// Merge these flags into the global overrides.
    #[must_use]
    pub fn overrides(&self, global: Overrides) -> Overrides {
        Overrides {
            server_port: self.port,
            callback_url: self.callback_url.clone(),
            board_ids: self.boards.clone(),
            max_concurrent: self.max_concurrent,
            ..global
        }
    }
}

// ============================================================================
// Webhook Commands
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum WebhookCommands {
    /// Register a webhook on a board
    Register {
        /// Board id
        board_id: String,

        /// Callback URL (default: TRELLO_CALLBACK_URL)
        #[arg(long)]
        callback_url: Option<String>,
    },

    /// Delete a webhook by id
    Delete {
        /// Webhook id
        webhook_id: String,
    },

    /// List webhooks owned by the API token
    List,
}

// ============================================================================
// Card Commands
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum CardCommands {
    /// Show one card record
    Show {
        /// Card id
        card_id: String,
    },

    /// List card records, most recently updated first
    List {
        /// Only archived cards
        #[arg(long, conflicts_with = "active")]
        archived: bool,

        /// Only active cards
        #[arg(long)]
        active: bool,

        /// Maximum number of cards
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
}
