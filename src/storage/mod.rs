//! SQLite storage layer for cardsync.
//!
//! The reconciler only sees the narrow [`CardStore`] interface: read one
//! record, write one record. [`SqliteStorage`] is the production
//! implementation; tests use it with an in-memory database.
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - SQLite storage implementation

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::Result;
use crate::model::Card;

/// Record store for card state.
///
/// Not a cache: the store is the single source of truth for what was last
/// synced. Implementations must be safe to call concurrently for different
/// card ids.
pub trait CardStore: Send + Sync {
    /// Load the record for a card.
    ///
    /// `Ok(None)` means the card has never been seen; it is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_card(&self, id: &str) -> Result<Option<Card>>;

    /// Insert or replace the record for `card.id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn upsert_card(&self, card: &Card) -> Result<()>;

    /// Check that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store does not answer.
    fn ping(&self) -> Result<()>;
}
