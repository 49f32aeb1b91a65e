pub mod health;
pub mod list;
pub mod query;

use std::sync::Arc;

use libunieval_core::BackendAdapter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::EvaluatorConfig;
use crate::error::Result;

/// Build the adapter for the selected backend, applying a timeout override
pub fn open_backend(
    cli: &Cli,
    config: &EvaluatorConfig,
    timeout_secs: Option<u64>,
) -> Result<Arc<dyn BackendAdapter>> {
    let mut backend = config.backend(&cli.backend)?.clone();
    if let Some(secs) = timeout_secs {
        backend.set_timeout_secs(secs);
    }
    Ok(backend.build(&cli.backend)?)
}

/// Cancel `token` on Ctrl-C or SIGTERM. Abort the handle once the work is done.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("received shutdown signal, cancelling");
        token.cancel();
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
