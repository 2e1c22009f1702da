//! Offline mutation queue and sync engine.
//!
//! Writes made while the device is offline are queued locally under
//! placeholder ids, then replayed in order against the remote store once
//! connectivity returns, with placeholder ids rewritten to remote ids.

mod connectivity;
mod engine;
mod ids;
mod models;
mod queue;
mod remap;
mod scheduler;

pub use connectivity::{ConnectivityMonitor, NetworkStatus};
pub use engine::{OfflineError, OfflineQueue, RetryPolicy};
pub use ids::{is_local_id, LocalId, LocalIdAllocator, RemoteId, LOCAL_ID_PREFIX};
pub use models::{
    AssetPatch, AssetPayload, AssetUpdate, DeadLetter, FolderPayload, MediaType, Mutation, PendingMedia,
    PendingMutation, SyncReport,
};
pub use queue::{ActionQueue, DeadLetters, DEAD_LETTER_STORAGE_KEY, ID_MAP_STORAGE_KEY, QUEUE_STORAGE_KEY};
pub use remap::{IdMap, MappedId};
pub use scheduler::{next_backoff, start_sync_scheduler, SchedulerSettings, SyncScheduler, SyncSchedulerMessage};
