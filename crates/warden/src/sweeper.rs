//! Background reclamation of expired failure counters and challenges.

use std::sync::Arc;
use std::time::Duration;

use crate::gate::Gate;

/// Background worker that sweeps the gate's caches
pub async fn sweeper(
    gate: Arc<Gate>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!("🧹 Sweeper started (every {}s)", interval.as_secs());

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (counters, challenges) = gate.sweep();
                if counters + challenges > 0 {
                    tracing::debug!(counters, challenges, "Swept expired entries");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("🧹 Sweeper shutting down...");
                break;
            }
        }
    }
}
