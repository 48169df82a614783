//! SQLite storage implementation.
//!
//! Holds one connection behind a mutex so the store can be shared by
//! concurrently processed webhooks. Each call locks only for the duration of
//! its own statement.

use crate::error::{Error, Result};
use crate::model::Card;
use crate::storage::CardStore;
use crate::storage::schema::apply_schema;
use chrono::DateTime;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const CARD_COLUMNS: &str =
    "id, name, due_at, url, board_id, archived, event_id, created_at, updated_at";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("storage connection lock poisoned".to_string()))
    }

    /// List cards, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_cards(&self, archived: Option<bool>, limit: usize) -> Result<Vec<Card>> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let cards = if let Some(archived) = archived {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CARD_COLUMNS} FROM cards WHERE archived = ?1
                 ORDER BY updated_at DESC LIMIT ?2"
            ))?;
            stmt.query_map(rusqlite::params![archived, limit], map_card_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CARD_COLUMNS} FROM cards ORDER BY updated_at DESC LIMIT ?1"
            ))?;
            stmt.query_map([limit], map_card_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(cards)
    }

    /// Close the underlying connection, flushing the WAL.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite refuses to close the connection.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| Error::Other("storage connection lock poisoned".to_string()))?;
        conn.close().map_err(|(_, e)| Error::Database(e))
    }
}

impl CardStore for SqliteStorage {
    fn get_card(&self, id: &str) -> Result<Option<Card>> {
        let conn = self.lock()?;
        let card = conn
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
                [id],
                map_card_row,
            )
            .optional()?;
        Ok(card)
    }

    fn upsert_card(&self, card: &Card) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO cards (id, name, due_at, url, board_id, archived, event_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                due_at = excluded.due_at,
                url = excluded.url,
                board_id = excluded.board_id,
                archived = excluded.archived,
                event_id = excluded.event_id,
                updated_at = excluded.updated_at",
            rusqlite::params![
                card.id,
                card.name,
                card.due_at.map(|d| d.to_rfc3339()),
                card.url,
                card.board_id,
                card.archived,
                card.event_id,
                card.created_at,
                card.updated_at,
            ],
        )?;
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

// Helper to map card rows
fn map_card_row(row: &rusqlite::Row) -> rusqlite::Result<Card> {
    let due_at = row
        .get::<_, Option<String>>(2)?
        .map(|value| DateTime::parse_from_rfc3339(&value))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(Card {
        id: row.get(0)?,
        name: row.get(1)?,
        due_at,
        url: row.get(3)?,
        board_id: row.get(4)?,
        archived: row.get(5)?,
        event_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
