use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Online,
    Offline,
    Unknown,
}

/// Last known network status, observable through a watch channel.
///
/// The platform layer (or the CLI's reachability probe) feeds it with
/// `set_status`; the sync scheduler subscribes to it.
pub struct ConnectivityMonitor {
    sender: watch::Sender<NetworkStatus>,
}

impl ConnectivityMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.sender.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status() == NetworkStatus::Online
    }

    /// Record a new status. Returns true on an offline→online edge.
    pub fn set_status(&self, status: NetworkStatus) -> bool {
        let previous = self.sender.send_replace(status);
        if previous != status {
            log::info!("Connectivity: {:?} -> {:?}", previous, status);
        }
        previous != NetworkStatus::Online && status == NetworkStatus::Online
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Unknown)
    }
}
