//! Card command implementations (inspect synced records).

use chrono::{DateTime, SecondsFormat, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::cli::CardCommands;
use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::model::{Card, CardState};
use crate::storage::{CardStore, SqliteStorage};
use std::path::PathBuf;

#[derive(Serialize)]
struct CardOutput<'a> {
    #[serde(flatten)]
    card: &'a Card,
    state: CardState,
}

#[derive(Serialize)]
struct CardListOutput<'a> {
    cards: Vec<CardOutput<'a>>,
    count: usize,
}

/// Execute card commands.
///
/// # Errors
///
/// Returns [`Error::CardNotFound`] for an unknown id, or a database error.
pub fn execute(command: &CardCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine database path".into()))?;
    let storage = SqliteStorage::open(&db_path)?;

    match command {
        CardCommands::Show { card_id } => show(&storage, card_id, json),
        CardCommands::List {
            archived,
            active,
            limit,
        } => {
            let filter = if *archived {
                Some(true)
            } else if *active {
                Some(false)
            } else {
                None
            };
            list(&storage, filter, *limit, json)
        }
    }
}

fn show(storage: &SqliteStorage, card_id: &str, json: bool) -> Result<()> {
    let card = storage
        .get_card(card_id)?
        .ok_or_else(|| Error::CardNotFound {
            id: card_id.to_string(),
        })?;

    if json {
        let output = CardOutput {
            card: &card,
            state: card.state(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", card.name.bold());
    println!("  ID:       {}", card.id);
    println!("  State:    {}", colored_state(card.state()));
    println!("  Board:    {}", card.board_id);
    println!("  URL:      {}", card.url);
    println!(
        "  Due:      {}",
        card.due_at.map_or_else(|| "-".to_string(), |d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
    );
    println!(
        "  Event:    {}",
        if card.has_event() { card.event_id.as_str() } else { "-" }
    );
    println!("  Updated:  {}", format_millis(card.updated_at));
    Ok(())
}

fn list(storage: &SqliteStorage, archived: Option<bool>, limit: usize, json: bool) -> Result<()> {
    let cards = storage.list_cards(archived, limit)?;

    if json {
        let output = CardListOutput {
            count: cards.len(),
            cards: cards
                .iter()
                .map(|card| CardOutput {
                    card,
                    state: card.state(),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if cards.is_empty() {
        println!("No cards recorded yet.");
        return Ok(());
    }

    println!("{}", format!("Cards ({})", cards.len()).cyan().bold());
    for card in &cards {
        let due = card
            .due_at
            .map_or_else(|| "no due date".to_string(), |d| d.format("%Y-%m-%d").to_string());
        println!(
            "  {} {} [{}] {}",
            card.id.dimmed(),
            card.name,
            colored_state(card.state()),
            due
        );
    }
    Ok(())
}

fn colored_state(state: CardState) -> colored::ColoredString {
    match state {
        CardState::ActiveWithEvent => state.as_str().green(),
        CardState::ActiveNoDue => state.as_str().normal(),
        CardState::Archived => state.as_str().dimmed(),
        CardState::Untracked => state.as_str().yellow(),
    }
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map_or_else(|| "-".to_string(), |d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
}
