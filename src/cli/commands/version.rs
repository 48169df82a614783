//! Version command implementation.

use crate::error::Result;
use crate::storage::schema::CURRENT_SCHEMA_VERSION;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    build: &'static str,
    schema_version: i32,
}

impl VersionOutput {
    fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            build: if cfg!(debug_assertions) { "dev" } else { "release" },
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let output = VersionOutput::current();

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "{} {} ({}, schema v{})",
            output.name, output.version, output.build, output.schema_version
        );
    }
    Ok(())
}
