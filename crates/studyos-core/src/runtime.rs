//! Long-running background loops.
//!
//! The notification scan, the wellbeing pass, and the achievement sweep run
//! as tokio tasks owned by the process. Each loop selects between its tick
//! interval and a shared shutdown channel; errors are logged and the loop
//! continues, backing off exponentially (capped at five minutes) while the
//! store is unhappy.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};

use crate::clock;
use crate::engine::Engine;
use crate::error::CoreError;

/// Notification scan cadence.
const NOTIFICATION_TICK: Duration = Duration::from_secs(15 * 60);

/// Wellbeing pass cadence (the write itself is per-date idempotent).
const WELLBEING_TICK: Duration = Duration::from_secs(60 * 60);

/// Achievement sweep cadence; event-driven passes cover the hot path.
const ACHIEVEMENT_TICK: Duration = Duration::from_secs(15 * 60);

/// Base backoff after a failed tick.
const BACKOFF_BASE_SECS: u64 = 5;

/// Backoff ceiling.
const BACKOFF_CAP_SECS: u64 = 300;

/// Launch the background loops. Send `true` on the watch channel to stop
/// them; each loop finishes its in-flight work and exits.
pub fn spawn_loops(engine: Arc<Engine>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(notification_loop(engine.clone(), shutdown.clone())),
        tokio::spawn(wellbeing_loop(engine.clone(), shutdown.clone())),
        tokio::spawn(achievement_loop(engine, shutdown)),
    ]
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

fn backoff_after(failures: u32) -> Duration {
    let secs = BACKOFF_BASE_SECS.saturating_mul(1u64 << failures.min(10));
    Duration::from_secs(secs.min(BACKOFF_CAP_SECS))
}

async fn notification_loop(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(NOTIFICATION_TICK);
    let mut failures = 0u32;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                match engine.notifications().tick(clock::now()) {
                    Ok(produced) => {
                        failures = 0;
                        if produced > 0 {
                            tracing::debug!(produced, "notification scan");
                        }
                    }
                    Err(err) => {
                        failures += 1;
                        tracing::error!(error = %err, failures, "notification scan failed");
                        if is_backend_error(&err) {
                            tokio::select! {
                                _ = shutdown.changed() => break,
                                _ = sleep(backoff_after(failures)) => {}
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn wellbeing_loop(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(WELLBEING_TICK);
    let mut failures = 0u32;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let now = clock::now();
                match engine.wellbeing_score(now.date(), now) {
                    Ok(metric) => {
                        failures = 0;
                        tracing::debug!(score = metric.score, "wellbeing pass");
                    }
                    Err(err) => {
                        failures += 1;
                        tracing::error!(error = %err, failures, "wellbeing pass failed");
                        if is_backend_error(&err) {
                            tokio::select! {
                                _ = shutdown.changed() => break,
                                _ = sleep(backoff_after(failures)) => {}
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn achievement_loop(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(ACHIEVEMENT_TICK);
    let mut failures = 0u32;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                match engine.check_achievements(clock::now()) {
                    Ok(awarded) => {
                        failures = 0;
                        if !awarded.is_empty() {
                            tracing::info!(?awarded, "achievements earned");
                        }
                    }
                    Err(err) => {
                        failures += 1;
                        tracing::error!(error = %err, failures, "achievement sweep failed");
                        if is_backend_error(&err) {
                            tokio::select! {
                                _ = shutdown.changed() => break,
                                _ = sleep(backoff_after(failures)) => {}
                            }
                        }
                    }
                }
            }
        }
    }
}

fn is_backend_error(err: &CoreError) -> bool {
    matches!(err, CoreError::Backend(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Store;

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_after(0), Duration::from_secs(5));
        assert_eq!(backoff_after(1), Duration::from_secs(10));
        assert_eq!(backoff_after(2), Duration::from_secs(20));
        assert_eq!(backoff_after(6), Duration::from_secs(300));
        assert_eq!(backoff_after(100), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn loops_exit_on_shutdown() {
        let engine = Arc::new(Engine::new(
            Arc::new(Store::open_memory().unwrap()),
            Config::default(),
        ));
        let (tx, rx) = watch::channel(false);
        let handles = spawn_loops(engine, rx);

        tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("loop did not stop")
                .expect("loop panicked");
        }
    }
}
