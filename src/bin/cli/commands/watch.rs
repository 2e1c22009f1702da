use std::time::Duration;

use anyhow::{Context, Result};

use fieldkit_lib::offline::{start_sync_scheduler, ConnectivityMonitor, NetworkStatus};

use crate::app::App;

/// Probe the remote on an interval and let the scheduler drain the queue
/// whenever it becomes reachable. Runs until Ctrl-C.
pub async fn run(app: &App, probe_interval: u64) -> Result<()> {
    let probe_interval = Duration::from_secs(probe_interval.max(1));
    let monitor = ConnectivityMonitor::default();
    let scheduler = start_sync_scheduler(app.queue.clone(), &monitor, app.config.scheduler_settings());

    println!(
        "Watching {} ({} pending). Press Ctrl-C to stop.",
        app.remote.base_url(),
        app.queue.queue_length()
    );

    let mut ticker = tokio::time::interval(probe_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = match app.remote.ping().await {
                    Ok(()) => NetworkStatus::Online,
                    Err(e) => {
                        log::debug!("Remote unreachable: {}", e);
                        NetworkStatus::Offline
                    }
                };
                monitor.set_status(status);
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    scheduler.shutdown();
    scheduler.join().await;
    println!("Stopped ({} pending).", app.queue.queue_length());
    Ok(())
}
