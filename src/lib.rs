//! cardsync - mirror board card due dates into calendar events.
//!
//! The board service posts a webhook for every card change. Each delivery is
//! reconciled against the last synced state of the card: calendar events are
//! created, updated or deleted so that every open card with a due date has
//! exactly one all-day event, and the new state is recorded in SQLite.
//!
//! # Architecture
//!
//! - [`server`] - axum webhook transport, worker pool, health check
//! - [`reconcile`] - the reconciliation state machine
//! - [`calendar`] - calendar client (`Scheduler` trait, Google implementation)
//! - [`trello`] - board webhook registration (`Subscriptions`)
//! - [`retry`] - bounded retry with backoff for remote calls
//! - [`storage`] - SQLite card store
//! - [`model`] - `Card` record and flat `Notification`
//! - [`config`] - settings resolution
//! - [`cli`] - command-line interface using clap
//! - [`error`] - error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod calendar;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod retry;
pub mod server;
pub mod storage;
pub mod trello;

pub use error::{Error, Result};
