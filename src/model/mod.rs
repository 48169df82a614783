//! Data models for cardsync.
//!
//! This module contains the domain models:
//! - Card (the persisted last-synced state of a board card)
//! - Notification (a decoded board webhook, the input to reconciliation)

pub mod card;
pub mod notification;

pub use card::{Card, CardState, board_prefix, prefixed_name};
pub use notification::{Notification, UPDATE_CARD};
