//! Command implementations.

pub mod card;
pub mod completions;
pub mod serve;
pub mod version;
pub mod webhook;
