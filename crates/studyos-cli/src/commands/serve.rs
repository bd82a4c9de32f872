use std::sync::Arc;

use studyos_core::runtime;

use super::{open_engine, CliError};

/// Run the background loops (notification scans, wellbeing passes,
/// achievement sweeps) until Ctrl+C, printing live notifications.
pub fn run() -> Result<(), CliError> {
    let engine = Arc::new(open_engine()?);
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handles = runtime::spawn_loops(engine.clone(), shutdown_rx);

        let mut rx = engine.subscribe();
        let printer = tokio::spawn(async move {
            while let Ok(notification) = rx.recv().await {
                println!(
                    "[{}] {}: {}",
                    notification.kind.as_str(),
                    notification.title,
                    notification.message
                );
            }
        });

        runtime::shutdown_signal().await;
        if shutdown_tx.send(true).is_err() {
            tracing::warn!("background loops already gone");
        }
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "background task join failed");
            }
        }
        printer.abort();
    });

    Ok(())
}
