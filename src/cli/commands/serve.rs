//! Serve command: the long-running webhook server.
//!
//! Lifecycle:
//! 1. open the store and build the clients
//! 2. start serving, so the board service can validate the callback URL
//! 3. register one webhook per board (any failure stops the server)
//! 4. on SIGINT/SIGTERM: stop accepting requests, drain in-flight work,
//!    deregister webhooks, close the store
//!
//! A second signal during cleanup exits immediately with status 1.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cli::ServeArgs;
use crate::config::{Overrides, Settings};
use crate::error::{Error, Result};
use crate::reconcile::Reconciler;
use crate::server::{self, AppState, WEBHOOK_PATH, WorkerPool};
use crate::storage::SqliteStorage;
use crate::trello::Subscriptions;

#[derive(Serialize)]
struct ServeOutput<'a> {
    status: &'a str,
    address: String,
    webhook_path: &'a str,
    boards: Vec<&'a str>,
}

#[derive(Serialize)]
struct ShutdownOutput {
    status: &'static str,
    drained: bool,
    webhooks_deleted: usize,
    webhooks_failed: usize,
}

/// Execute the serve command.
///
/// # Errors
///
/// Returns an error if settings are incomplete, the store cannot be opened,
/// the port cannot be bound, or webhook registration fails.
pub fn execute(args: &ServeArgs, global: Overrides, json: bool) -> Result<()> {
    let settings = Settings::resolve(args.overrides(global))?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;
    rt.block_on(serve(settings, json))
}

async fn serve(settings: Settings, json: bool) -> Result<()> {
    let boards = settings.trello.require_boards()?.to_vec();
    settings.trello.require_callback_url()?;
    let trello = settings.trello.client()?;
    let calendar = settings.google.client()?;
    let store = SqliteStorage::open(&settings.db_path)?;
    info!(db = %settings.db_path.display(), "Opened card store");

    let reconciler = Arc::new(Reconciler::new(store, calendar));
    let pool = WorkerPool::new(settings.max_concurrent);
    let app = server::router(Arc::new(AppState::new(
        Arc::clone(&reconciler),
        pool.clone(),
    )));

    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], settings.server_port))).await?;
    let addr = listener.local_addr()?;
    info!(%addr, max_concurrent = settings.max_concurrent, "Listening for webhooks");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    let mut subscriptions = match Subscriptions::register_all(&trello, &boards).await {
        Ok(subscriptions) => subscriptions,
        Err(e) => {
            let _ = stop_tx.send(());
            let _ = server_task.await;
            return Err(e);
        }
    };
    info!(count = subscriptions.len(), "Webhooks registered");

    if json {
        let output = ServeOutput {
            status: "running",
            address: addr.to_string(),
            webhook_path: WEBHOOK_PATH,
            boards: boards.iter().map(String::as_str).collect(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Listening on {addr}{WEBHOOK_PATH}");
        for subscription in subscriptions.iter() {
            println!("  board {} -> webhook {}", subscription.board_id, subscription.webhook_id);
        }
    }

    tokio::select! {
        signal = wait_for_signal() => {
            info!(signal, "Shutdown signal received");
        }
        result = &mut server_task => {
            // Server stopped on its own; still clean up the webhooks
            match result {
                Ok(Ok(())) => warn!("Server stopped unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "Server failed"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    tokio::spawn(async {
        let signal = wait_for_signal().await;
        eprintln!("\nReceived second {signal}, exiting immediately.");
        std::process::exit(1);
    });

    let _ = stop_tx.send(());

    let drained = pool.close_and_drain(settings.shutdown_timeout).await;
    if !drained {
        warn!(
            timeout_secs = settings.shutdown_timeout.as_secs(),
            in_flight = pool.in_flight(),
            "In-flight webhooks did not finish before the shutdown timeout"
        );
    }

    if !stop_server(&mut server_task, settings.shutdown_timeout).await {
        warn!("Server did not stop in time, aborted open connections");
    }

    let report = subscriptions.deregister_all(&trello).await;
    if !report.is_clean() {
        warn!(
            failed = report.failed.len(),
            "Some webhooks could not be deleted; remove them with `cardsync webhook delete`"
        );
    }

    match Arc::try_unwrap(reconciler) {
        Ok(reconciler) => {
            let (store, _) = reconciler.into_parts();
            store.close()?;
            info!("Card store closed");
        }
        Err(_) => warn!("Card store still referenced, leaving it to be dropped"),
    }

    if json {
        let output = ShutdownOutput {
            status: "stopped",
            drained,
            webhooks_deleted: report.deleted.len(),
            webhooks_failed: report.failed.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "Stopped ({} webhook(s) deleted, {} failed)",
            report.deleted.len(),
            report.failed.len()
        );
    }

    Ok(())
}

/// Wait up to `timeout` for the server task, aborting it on expiry.
///
/// Returns `false` if the task had to be aborted. Either way the task has
/// been reaped on return, so everything it owned is dropped. A finished task
/// is not polled again, since its output may already have been taken.
async fn stop_server<T>(task: &mut JoinHandle<T>, timeout: Duration) -> bool {
    if task.is_finished() {
        return true;
    }
    if tokio::time::timeout(timeout, &mut *task).await.is_ok() {
        return true;
    }
    task.abort();
    let _ = task.await;
    false
}

/// Wait for SIGINT or SIGTERM; returns the signal name.
async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                ctrl_c().await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        "Ctrl+C"
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
