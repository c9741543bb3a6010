use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Resolve on the first SIGTERM or SIGINT and return its name.
///
/// Falls back to ctrl-c when the unix handlers cannot be registered.
pub async fn wait_for_signal() -> &'static str {
    let handlers = (signal(SignalKind::terminate()), signal(SignalKind::interrupt()));
    match handlers {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Signal handlers unavailable, waiting for ctrl-c");
            match tokio::signal::ctrl_c().await {
                Ok(()) => "ctrl-c",
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for ctrl-c, running until killed");
                    std::future::pending().await
                }
            }
        }
    }
}

/// Cancel a fresh token when the process is asked to stop.
///
/// The rotation loops and the HTTP server stop on the token; the node then
/// saves its data file.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let received = wait_for_signal().await;
        tracing::info!(signal = received, "Shutting down, finishing in-flight writes");
        trigger.cancel();
    });

    token
}
