//! Webhook command implementations (manual subscription management).

use colored::Colorize;
use serde::Serialize;

use crate::cli::WebhookCommands;
use crate::config::{Overrides, Settings};
use crate::error::{Error, Result};
use crate::trello::{TrelloClient, WebhookApi};

#[derive(Serialize)]
struct RegisterOutput<'a> {
    webhook_id: String,
    board_id: &'a str,
    callback_url: &'a str,
}

#[derive(Serialize)]
struct DeleteOutput<'a> {
    webhook_id: &'a str,
    deleted: bool,
}

/// Execute webhook commands.
///
/// # Errors
///
/// Returns an error if credentials are missing or the board service call fails.
pub fn execute(command: &WebhookCommands, global: Overrides, json: bool) -> Result<()> {
    let overrides = match command {
        WebhookCommands::Register { callback_url, .. } => Overrides {
            callback_url: callback_url.clone(),
            ..global
        },
        WebhookCommands::Delete { .. } | WebhookCommands::List => global,
    };
    let settings = Settings::resolve(overrides)?;
    let client = settings.trello.client()?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;

    match command {
        WebhookCommands::Register { board_id, .. } => {
            let callback_url = settings.trello.require_callback_url()?;
            rt.block_on(register(&client, board_id, callback_url, json))
        }
        WebhookCommands::Delete { webhook_id } => rt.block_on(delete(&client, webhook_id, json)),
        WebhookCommands::List => rt.block_on(list(&client, json)),
    }
}

async fn register(client: &TrelloClient, board_id: &str, callback_url: &str, json: bool) -> Result<()> {
    let webhook_id = client.register_webhook(board_id).await?;

    if json {
        let output = RegisterOutput {
            webhook_id,
            board_id,
            callback_url,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Registered webhook {} on board {board_id}", webhook_id.bold());
        println!("  Callback: {callback_url}");
    }
    Ok(())
}

async fn delete(client: &TrelloClient, webhook_id: &str, json: bool) -> Result<()> {
    client.delete_webhook(webhook_id).await?;

    if json {
        let output = DeleteOutput {
            webhook_id,
            deleted: true,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Deleted webhook {webhook_id}");
    }
    Ok(())
}

async fn list(client: &TrelloClient, json: bool) -> Result<()> {
    let webhooks = client.list_webhooks().await?;

    if json {
        println!("{}", serde_json::to_string(&webhooks)?);
        return Ok(());
    }

    if webhooks.is_empty() {
        println!("No webhooks registered for this token.");
        return Ok(());
    }

    println!("{}", format!("Webhooks ({})", webhooks.len()).cyan().bold());
    for hook in &webhooks {
        let state = if hook.active {
            "active".green()
        } else {
            "inactive".yellow()
        };
        println!("  {} [{state}] board {}", hook.id.bold(), hook.id_model);
        println!("    {}", hook.callback_url.dimmed());
        if !hook.description.is_empty() {
            println!("    {}", hook.description);
        }
    }
    Ok(())
}
