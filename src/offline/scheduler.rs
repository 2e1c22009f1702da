use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::connectivity::{ConnectivityMonitor, NetworkStatus};
use super::engine::OfflineQueue;
use super::models::SyncReport;

/// Messages to control the sync scheduler
#[derive(Debug)]
pub enum SyncSchedulerMessage {
    /// Run a pass now regardless of the timer
    SyncNow,
    /// App closing
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Delay before re-attempting pending work while online
    pub poll_interval: Duration,
    /// Upper bound for the delay after passes that made no progress
    pub max_backoff: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Delay before the next timed pass, given the outcome of the last one
pub fn next_backoff(current: Duration, report: &SyncReport, settings: &SchedulerSettings) -> Duration {
    if report.skipped {
        current
    } else if report.made_progress() {
        settings.poll_interval
    } else {
        (current * 2).min(settings.max_backoff)
    }
}

/// Handle for the background sync scheduler
pub struct SyncScheduler {
    sender: mpsc::Sender<SyncSchedulerMessage>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Request an immediate pass
    pub fn sync_now(&self) {
        let _ = self.sender.try_send(SyncSchedulerMessage::SyncNow);
    }

    /// Shut down the scheduler
    pub fn shutdown(&self) {
        let _ = self.sender.try_send(SyncSchedulerMessage::Shutdown);
    }

    /// Wait for the scheduler loop to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            log::error!("Sync scheduler task failed: {}", e);
        }
    }
}

/// Start the background sync scheduler.
///
/// Runs a pass on every offline→online edge and on request. While online a
/// timer also checks the stored queue and runs a pass if anything is pending. Must be called within a tokio runtime.
pub fn start_sync_scheduler(
    queue: Arc<OfflineQueue>,
    monitor: &ConnectivityMonitor,
    settings: SchedulerSettings,
) -> SyncScheduler {
    let (tx, rx) = mpsc::channel(32);
    let status = monitor.subscribe();

    let task = tokio::spawn(async move {
        sync_scheduler_loop(queue, status, rx, settings).await;
    });

    SyncScheduler { sender: tx, task }
}

async fn run_pass(queue: &OfflineQueue, wait: Duration, settings: &SchedulerSettings) -> Duration {
    match queue.sync().await {
        Ok(report) => {
            if report.error_count > 0 || report.dead_lettered > 0 {
                log::warn!(
                    "Sync scheduler: pass left {} queued, {} dead-lettered",
                    report.error_count,
                    report.dead_lettered
                );
            }
            next_backoff(wait, &report, settings)
        }
        Err(e) => {
            log::error!("Sync scheduler: pass failed: {}", e);
            (wait * 2).min(settings.max_backoff)
        }
    }
}

async fn sync_scheduler_loop(
    queue: Arc<OfflineQueue>,
    mut status: watch::Receiver<NetworkStatus>,
    mut receiver: mpsc::Receiver<SyncSchedulerMessage>,
    settings: SchedulerSettings,
) {
    log::info!("Sync scheduler started");

    let mut last_status = *status.borrow_and_update();
    let mut monitor_alive = true;
    let mut wait = settings.poll_interval;
    let mut run_now = last_status == NetworkStatus::Online;

    loop {
        if run_now {
            run_now = false;
            wait = run_pass(&queue, wait, &settings).await;
        }

        // Keep ticking while online: other processes may enqueue into the same store
        let timed = last_status == NetworkStatus::Online;
        if timed && queue.queue_length() > 0 {
            log::debug!("Sync scheduler: next pass in {:.0}s", wait.as_secs_f64());
        }

        tokio::select! {
            changed = status.changed(), if monitor_alive => {
                if changed.is_err() {
                    log::debug!("Sync scheduler: connectivity monitor dropped");
                    monitor_alive = false;
                    continue;
                }
                let current = *status.borrow_and_update();
                if current == NetworkStatus::Online && last_status != NetworkStatus::Online {
                    log::info!("Sync scheduler: back online, syncing");
                    wait = settings.poll_interval;
                    run_now = true;
                }
                last_status = current;
            }
            msg = receiver.recv() => {
                match msg {
                    Some(SyncSchedulerMessage::SyncNow) => {
                        log::info!("Sync scheduler: sync requested");
                        run_now = true;
                    }
                    Some(SyncSchedulerMessage::Shutdown) | None => {
                        log::info!("Sync scheduler shutting down");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(wait), if timed => {
                if queue.queue_length() > 0 {
                    run_now = true;
                } else {
                    wait = settings.poll_interval;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::models::{FolderPayload, Mutation};
    use crate::remote::{Collection, DocumentStore, RemoteError};
    use crate::storage::MemoryKvStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRemote {
        creates: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for CountingRemote {
        async fn create(&self, _collection: Collection, _document: Value) -> Result<String, RemoteError> {
            let n = self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(format!("R{}", n))
        }

        async fn update(&self, _collection: Collection, _id: &str, _document: Value) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: Duration::from_secs(3600),
            max_backoff: Duration::from_secs(3600),
        }
    }

    fn queue_with_one_folder(remote: Arc<CountingRemote>) -> Arc<OfflineQueue> {
        let queue = OfflineQueue::open(Arc::new(MemoryKvStore::new()), remote).unwrap();
        queue
            .enqueue(
                Mutation::CreateFolder(FolderPayload {
                    name: "Roof".into(),
                    project_id: "P1".into(),
                    ..Default::default()
                }),
                "P1",
            )
            .unwrap();
        Arc::new(queue)
    }

    async fn wait_until_drained(queue: &OfflineQueue) -> bool {
        for _ in 0..200 {
            if queue.queue_length() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[test]
    fn test_next_backoff() {
        let settings = SchedulerSettings::default();
        let failed = SyncReport {
            error_count: 1,
            ..Default::default()
        };
        let progressed = SyncReport {
            synced_count: 1,
            error_count: 1,
            ..Default::default()
        };

        let mut wait = settings.poll_interval;
        wait = next_backoff(wait, &failed, &settings);
        assert_eq!(wait, Duration::from_secs(60));
        wait = next_backoff(wait, &failed, &settings);
        wait = next_backoff(wait, &failed, &settings);
        wait = next_backoff(wait, &failed, &settings);
        assert_eq!(wait, Duration::from_secs(300));

        assert_eq!(next_backoff(wait, &SyncReport::skipped(), &settings), wait);
        assert_eq!(next_backoff(wait, &progressed, &settings), settings.poll_interval);
    }

    #[tokio::test]
    async fn test_syncs_on_online_edge() {
        let remote = Arc::new(CountingRemote::default());
        let queue = queue_with_one_folder(remote.clone());
        let monitor = ConnectivityMonitor::new(NetworkStatus::Offline);

        let scheduler = start_sync_scheduler(queue.clone(), &monitor, settings());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.queue_length(), 1);

        monitor.set_status(NetworkStatus::Online);
        assert!(wait_until_drained(&queue).await);
        assert_eq!(remote.creates.load(Ordering::SeqCst), 1);

        scheduler.shutdown();
        scheduler.join().await;
    }

    #[tokio::test]
    async fn test_sync_now_request() {
        let remote = Arc::new(CountingRemote::default());
        let queue = queue_with_one_folder(remote.clone());
        let monitor = ConnectivityMonitor::default();

        let scheduler = start_sync_scheduler(queue.clone(), &monitor, settings());
        scheduler.sync_now();

        assert!(wait_until_drained(&queue).await);
        scheduler.shutdown();
        scheduler.join().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let remote = Arc::new(CountingRemote::default());
        let queue = queue_with_one_folder(remote.clone());
        let monitor = ConnectivityMonitor::new(NetworkStatus::Offline);

        let scheduler = start_sync_scheduler(queue.clone(), &monitor, settings());
        scheduler.shutdown();
        scheduler.join().await;

        monitor.set_status(NetworkStatus::Online);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.queue_length(), 1);
        assert_eq!(remote.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timer_picks_up_work_from_another_handle() {
        let remote = Arc::new(CountingRemote::default());
        let store = Arc::new(MemoryKvStore::new());
        let queue = Arc::new(OfflineQueue::open(store.clone(), remote.clone()).unwrap());
        let other = OfflineQueue::open(store, remote.clone()).unwrap();
        let monitor = ConnectivityMonitor::new(NetworkStatus::Online);
        let settings = SchedulerSettings {
            poll_interval: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
        };

        let scheduler = start_sync_scheduler(queue.clone(), &monitor, settings);
        tokio::time::sleep(Duration::from_millis(20)).await;

        other
            .enqueue(
                Mutation::CreateFolder(FolderPayload {
                    name: "Walls".into(),
                    project_id: "P1".into(),
                    ..Default::default()
                }),
                "P1",
            )
            .unwrap();

        assert!(wait_until_drained(&queue).await);
        assert_eq!(remote.creates.load(Ordering::SeqCst), 1);

        scheduler.shutdown();
        scheduler.join().await;
    }
}
