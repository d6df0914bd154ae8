//! Hourly cleanup task: expired artifacts and stale temp entries.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use safebin_core::{SafebinResult, CLEANUP_INTERVAL, TEMP_EXPIRY};
use safebin_store::Store;

/// Runs until cancelled. Each tick does one full pass on a blocking thread;
/// no transaction is held across the sleep.
pub async fn run(store: Arc<Store>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the cleanup cadence starts one
    // interval from startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("sweeper stopping");
                return;
            }
            _ = ticker.tick() => {
                let store = store.clone();
                let outcome = tokio::task::spawn_blocking(move || -> SafebinResult<(usize, usize)> {
                    let reaped = store.sweep_expired(Utc::now())?;
                    let temp_removed = store.sweep_temp(TEMP_EXPIRY)?;
                    Ok((reaped, temp_removed))
                })
                .await;

                match outcome {
                    Ok(Ok((reaped, temp_removed))) if reaped + temp_removed > 0 => {
                        info!(reaped, temp_removed, "cleanup pass finished");
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!(error = %e, "cleanup pass failed"),
                    Err(e) => error!(error = %e, "cleanup task panicked"),
                }
            }
        }
    }
}
