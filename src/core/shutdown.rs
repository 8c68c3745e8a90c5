use tokio::signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShutdownReason {
    Interrupt,
    Terminate,
}

impl ShutdownReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ShutdownReason::Interrupt => "SIGINT",
            ShutdownReason::Terminate => "SIGTERM",
        }
    }
}

/// Resolves once the process is asked to stop. In-flight submissions finish
/// their transaction before the server exits.
pub(crate) async fn shutdown_signal() {
    let reason = wait_for_signal().await;
    tracing::info!(signal = reason.as_str(), "Shutdown requested, draining in-flight requests");
}

async fn wait_for_signal() -> ShutdownReason {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => ShutdownReason::Interrupt,
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for Ctrl+C");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                ShutdownReason::Terminate
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownReason>();

    tokio::select! {
        reason = interrupt => reason,
        reason = terminate => reason,
    }
}
