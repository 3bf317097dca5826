pub mod auth;
pub mod consumer;
pub mod db_changes;
pub mod producer;
pub mod standalone;

use std::future::Future;

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ServerError;

/// Cancel `token` on Ctrl+C or SIGTERM. Returns early if the token is
/// cancelled by someone else (e.g. a consumer that terminated).
pub async fn cancel_on_signal(token: CancellationToken) -> Result<(), ServerError> {
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r?;
            tracing::info!("interrupt received, shutting down...");
        }
        _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down..."),
        _ = token.cancelled() => return Ok(()),
    }
    token.cancel();
    Ok(())
}

/// Spawn `task` and cancel `token` once it finishes, for whatever reason,
/// so that sibling tasks wind down with it.
pub fn spawn_linked<F, T>(token: &CancellationToken, task: F) -> JoinHandle<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let token = token.clone();
    tokio::spawn(async move {
        let out = task.await;
        token.cancel();
        out
    })
}
