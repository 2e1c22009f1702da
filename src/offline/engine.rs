use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};
use thiserror::Error;

use super::ids::{is_local_id, LocalId, LocalIdAllocator, RemoteId};
use super::models::{DeadLetter, Mutation, PendingMedia, PendingMutation, SyncReport};
use super::queue::{referenced_ids, ActionQueue, DeadLetters, ID_MAP_STORAGE_KEY};
use super::remap::IdMap;
use crate::remote::{DocumentStore, MediaUploader, RemoteError};
use crate::storage::{load_json, save_json, KeyValueStore, StorageError};

/// How long a resolved id stays resolvable after nothing references it
const ID_MAP_RETENTION_DAYS: i64 = 7;

#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// When to stop retrying a mutation that keeps failing transiently
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed submissions after which an entry is dead-lettered (`None` = never)
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(false, |max| attempts >= max)
    }
}

struct QueueState {
    queue: ActionQueue,
    id_map: IdMap,
    dead_letters: DeadLetters,
}

impl QueueState {
    fn load(store: &dyn KeyValueStore) -> Result<Self, StorageError> {
        Ok(Self {
            queue: ActionQueue::load(store)?,
            id_map: load_json(store, ID_MAP_STORAGE_KEY)?.unwrap_or_default(),
            dead_letters: DeadLetters::load(store)?,
        })
    }
}

/// A reference that still points at an unsynced local id
enum Dependency {
    /// The creating mutation is queued or dead-lettered
    Pending(LocalId),
    /// Nothing on this device will ever resolve it
    Unknown(LocalId),
}

/// Releases the sync latch on every exit path
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Offline mutation queue and the engine that drains it.
///
/// `enqueue` persists immediately and never touches the network on the
/// caller's path. `sync` replays queued mutations in order against the
/// remote store, rewriting local ids to remote ids as creates succeed.
///
/// The store is the source of truth: other handles (or other processes)
/// may write to it at any time. Every state change reloads the stored
/// lists, applies its own removals and appends by local id, and writes the
/// result back, all under one mutex that is never held across an await.
pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn DocumentStore>,
    media: Option<Arc<dyn MediaUploader>>,
    allocator: LocalIdAllocator,
    policy: RetryPolicy,
    state: Mutex<QueueState>,
    syncing: AtomicBool,
}

impl OfflineQueue {
    /// Load persisted queue state from `store`
    pub fn open(store: Arc<dyn KeyValueStore>, remote: Arc<dyn DocumentStore>) -> Result<Self, OfflineError> {
        let state = QueueState::load(&*store)?;

        log::info!(
            "Offline queue opened: {} pending, {} dead-lettered, {} mapped ids",
            state.queue.len(),
            state.dead_letters.len(),
            state.id_map.len(),
        );

        Ok(Self {
            store,
            remote,
            media: None,
            allocator: LocalIdAllocator::new(),
            policy: RetryPolicy::default(),
            state: Mutex::new(state),
            syncing: AtomicBool::new(false),
        })
    }

    pub fn with_media_uploader(mut self, uploader: Arc<dyn MediaUploader>) -> Self {
        self.media = Some(uploader);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock and reload from the store before changing anything
    fn lock_fresh(&self) -> Result<MutexGuard<'_, QueueState>, OfflineError> {
        let mut state = self.lock_state();
        *state = QueueState::load(&*self.store)?;
        Ok(state)
    }

    /// Lock and reload for a read; keeps the cached copy if the store can't be read
    fn lock_current(&self) -> MutexGuard<'_, QueueState> {
        let mut state = self.lock_state();
        match QueueState::load(&*self.store) {
            Ok(loaded) => *state = loaded,
            Err(e) => log::warn!("Offline queue: reading stored state failed, using cached copy: {}", e),
        }
        state
    }

    /// Queue a mutation and return the local id the caller can render with.
    ///
    /// References to already-resolved local ids are stored as remote ids.
    pub fn enqueue(&self, mut mutation: Mutation, project_id: &str) -> Result<LocalId, OfflineError> {
        let stripped = mutation.strip_transient_flags();
        if !stripped.is_empty() {
            log::debug!("Stripped transient fields from {}: {:?}", mutation.kind(), stripped);
        }

        let local_id = self.allocator.allocate();
        {
            let mut state = self.lock_fresh()?;
            mutation.rewrite_references(&state.id_map);
            let kind = mutation.kind();
            state
                .queue
                .push(PendingMutation::new(local_id.clone(), project_id.to_string(), mutation));

            if let Err(e) = state.queue.save(&*self.store) {
                state.queue.remove(&local_id);
                return Err(e.into());
            }
            log::info!(
                "Queued {} {} for project {} ({} pending)",
                kind,
                local_id,
                project_id,
                state.queue.len(),
            );
        }

        self.touch_project(project_id);
        Ok(local_id)
    }

    /// Best-effort activity marker on the owning project; never queued or retried
    fn touch_project(&self, project_id: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("No async runtime, skipping activity update for project {}", project_id);
            return;
        };

        let remote = Arc::clone(&self.remote);
        let project_id = project_id.to_string();
        runtime.spawn(async move {
            if let Err(e) = remote.touch_project(&project_id).await {
                log::warn!("Activity update for project {} failed (ignored): {}", project_id, e);
            }
        });
    }

    /// Number of mutations waiting to be synced
    pub fn queue_length(&self) -> usize {
        self.lock_current().queue.len()
    }

    /// Snapshot of the queue, oldest first
    pub fn pending(&self) -> Vec<PendingMutation> {
        self.lock_current().queue.iter().cloned().collect()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock_current().dead_letters.iter().cloned().collect()
    }

    /// Remote id of a synced local id, while it is still retained
    pub fn resolve(&self, local_id: &str) -> Option<RemoteId> {
        self.lock_current().id_map.resolve(local_id).map(str::to_string)
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Move every dead letter back to the tail of the queue with a fresh attempt count
    pub fn retry_dead_letters(&self) -> Result<usize, OfflineError> {
        let mut state = self.lock_fresh()?;
        let letters = state.dead_letters.take_all();
        let count = letters.len();
        if count == 0 {
            return Ok(0);
        }

        for letter in letters {
            let mut entry = letter.entry;
            entry.attempts = 0;
            entry.last_error = None;
            state.queue.push(entry);
        }

        // Queue first: a crash in between duplicates rather than loses
        state.queue.save(&*self.store)?;
        state.dead_letters.save(&*self.store)?;
        log::info!("Requeued {} dead-lettered mutation(s)", count);
        Ok(count)
    }

    /// Drain the queue once against the remote store.
    ///
    /// Each entry present when the pass starts is attempted at most once;
    /// the pass ends when the front of the queue is an entry that was
    /// already attempted or was queued after the pass began. A call made
    /// while another pass is running returns a skipped report.
    pub async fn sync(&self) -> Result<SyncReport, OfflineError> {
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            log::info!("Offline sync already running, ignoring trigger");
            return Ok(SyncReport::skipped());
        };

        let mut to_attempt: HashSet<LocalId> = {
            let state = self.lock_fresh()?;
            state.queue.iter().map(|entry| entry.local_id.clone()).collect()
        };
        let mut report = SyncReport::default();
        if to_attempt.is_empty() {
            return Ok(report);
        }

        let started = std::time::Instant::now();
        log::info!("Offline sync: starting pass over {} queued mutation(s)", to_attempt.len());

        loop {
            let (entry, prepared) = {
                let mut state = self.lock_fresh()?;
                let entry = match state.queue.front() {
                    Some(front) if to_attempt.remove(&front.local_id) => front.clone(),
                    _ => break,
                };

                let mut prepared = entry.mutation.clone();
                prepared.rewrite_references(&state.id_map);

                match find_unresolved(&prepared, &state) {
                    Some(Dependency::Pending(dependency)) => {
                        self.defer(&mut state, entry, &dependency)?;
                        report.error_count += 1;
                        report.blocked_count += 1;
                        continue;
                    }
                    Some(Dependency::Unknown(reference)) => {
                        let reason = format!("unresolved reference {}", reference);
                        log::warn!("Offline sync: {} {} dead-lettered: {}", entry.mutation.kind(), entry.local_id, reason);
                        self.dead_letter(&mut state, entry, reason)?;
                        report.dead_lettered += 1;
                        continue;
                    }
                    None => (entry, prepared),
                }
            };

            let outcome = self.submit(&entry.local_id, prepared).await;
            self.record_outcome(entry, outcome, &mut report)?;

            tokio::task::yield_now().await;
        }

        self.collect_id_map()?;

        log::info!(
            "Offline sync: pass complete in {:?}: synced={}, errors={}, blocked={}, dead-lettered={}",
            started.elapsed(),
            report.synced_count,
            report.error_count,
            report.blocked_count,
            report.dead_lettered,
        );
        Ok(report)
    }

    /// Send one prepared mutation. Returns the new remote id for creates.
    async fn submit(&self, local_id: &str, mut mutation: Mutation) -> Result<Option<RemoteId>, RemoteError> {
        if let Mutation::CreateAsset(asset) = &mut mutation {
            if let Some(media) = asset.pending_media.take() {
                let url = self.upload_media(&media).await?;
                self.media_uploaded(local_id, &media, &url);
                asset.media_url = Some(url);
            }
        }

        let collection = mutation.collection();
        let document = mutation.to_document()?;
        match &mutation {
            Mutation::UpdateAsset(update) => {
                self.remote.update(collection, &update.asset_id, document).await?;
                Ok(None)
            }
            Mutation::CreateFolder(_) | Mutation::CreateAsset(_) => {
                self.remote.create(collection, document).await.map(Some)
            }
        }
    }

    async fn upload_media(&self, media: &PendingMedia) -> Result<String, RemoteError> {
        let uploader = self
            .media
            .as_ref()
            .ok_or_else(|| RemoteError::NotConfigured("media uploader".to_string()))?;
        let data = tokio::fs::read(&media.local_path).await?;
        let url = uploader.upload(&media.file_name, &media.content_type, data).await?;
        log::debug!("Uploaded {} -> {}", media.local_path.display(), url);
        Ok(url)
    }

    /// Store the uploaded URL on the queued entry so a retry reuses it, then
    /// drop the staged file. The file is kept if the URL could not be stored.
    fn media_uploaded(&self, local_id: &str, media: &PendingMedia, url: &str) {
        match self.record_upload(local_id, url) {
            Ok(true) => {
                if let Err(e) = std::fs::remove_file(&media.local_path) {
                    log::warn!("Failed to remove staged media {}: {}", media.local_path.display(), e);
                }
            }
            Ok(false) => log::debug!("Offline sync: {} no longer queued, keeping staged media", local_id),
            Err(e) => log::warn!("Offline sync: failed to record upload for {}: {}", local_id, e),
        }
    }

    fn record_upload(&self, local_id: &str, url: &str) -> Result<bool, OfflineError> {
        let mut state = self.lock_fresh()?;
        let Some(entry) = state.queue.get_mut(local_id) else {
            return Ok(false);
        };
        let Mutation::CreateAsset(asset) = &mut entry.mutation else {
            return Ok(false);
        };
        asset.pending_media = None;
        asset.media_url = Some(url.to_string());
        state.queue.save(&*self.store)?;
        Ok(true)
    }

    /// Fold a submission result into the stored queue
    fn record_outcome(
        &self,
        entry: PendingMutation,
        outcome: Result<Option<RemoteId>, RemoteError>,
        report: &mut SyncReport,
    ) -> Result<(), OfflineError> {
        let mut state = self.lock_fresh()?;
        let stored = state.queue.remove(&entry.local_id);

        match outcome {
            Ok(remote_id) => {
                if let Some(remote_id) = remote_id {
                    state.id_map.insert(entry.local_id.clone(), remote_id.clone());
                    // Map before queue: a crash in between resubmits rather than strands dependents
                    save_json(&*self.store, ID_MAP_STORAGE_KEY, &state.id_map)?;
                    log::info!(
                        "Offline sync: {} {} synced as {}",
                        entry.mutation.kind(),
                        entry.local_id,
                        remote_id
                    );
                    report.remapped.push((entry.local_id.clone(), remote_id));
                } else {
                    log::info!("Offline sync: {} {} synced", entry.mutation.kind(), entry.local_id);
                }
                state.queue.save(&*self.store)?;
                report.synced_count += 1;
            }
            Err(e) => {
                // The stored copy carries anything recorded during submission
                let Some(mut failed) = stored else {
                    log::warn!(
                        "Offline sync: {} {} was removed from the queue elsewhere, dropping failure: {}",
                        entry.mutation.kind(),
                        entry.local_id,
                        e
                    );
                    return Ok(());
                };
                failed.attempts += 1;
                failed.last_error = Some(e.to_string());

                if e.is_permanent() || self.policy.exhausted(failed.attempts) {
                    let reason = if e.is_permanent() {
                        e.to_string()
                    } else {
                        format!("gave up after {} attempts: {}", failed.attempts, e)
                    };
                    log::warn!(
                        "Offline sync: {} {} dead-lettered: {}",
                        failed.mutation.kind(),
                        failed.local_id,
                        reason
                    );
                    self.dead_letter(&mut state, failed, reason)?;
                    report.dead_lettered += 1;
                } else {
                    log::warn!(
                        "Offline sync: {} {} failed (attempt {}), requeued: {}",
                        failed.mutation.kind(),
                        failed.local_id,
                        failed.attempts,
                        e
                    );
                    state.queue.push(failed);
                    state.queue.save(&*self.store)?;
                    report.error_count += 1;
                }
            }
        }
        Ok(())
    }

    /// Move an entry waiting on a dependency to the tail without submitting it
    fn defer(&self, state: &mut QueueState, mut entry: PendingMutation, dependency: &str) -> Result<(), OfflineError> {
        log::debug!(
            "Offline sync: {} {} waits on {}, deferred",
            entry.mutation.kind(),
            entry.local_id,
            dependency
        );
        state.queue.remove(&entry.local_id);
        entry.last_error = Some(format!("waiting on {}", dependency));
        state.queue.push(entry);
        state.queue.save(&*self.store)?;
        Ok(())
    }

    fn dead_letter(&self, state: &mut QueueState, entry: PendingMutation, reason: String) -> Result<(), OfflineError> {
        state.queue.remove(&entry.local_id);
        state.dead_letters.push(DeadLetter {
            entry,
            reason,
            failed_at: Utc::now(),
        });
        // Dead letters first: a crash in between duplicates rather than loses
        state.dead_letters.save(&*self.store)?;
        state.queue.save(&*self.store)?;
        Ok(())
    }

    /// Forget mappings nothing references any more once they age out
    fn collect_id_map(&self) -> Result<(), OfflineError> {
        let mut guard = self.lock_fresh()?;
        let state = &mut *guard;

        let referenced = referenced_ids(&state.queue, &state.dead_letters);
        let cutoff = Utc::now() - Duration::days(ID_MAP_RETENTION_DAYS);
        let removed = state.id_map.retain_live(&referenced, cutoff);
        if removed > 0 {
            save_json(&*self.store, ID_MAP_STORAGE_KEY, &state.id_map)?;
            log::debug!("Offline sync: dropped {} retired id mapping(s)", removed);
        }
        Ok(())
    }
}

/// First reference that is still a local id after rewriting
fn find_unresolved(mutation: &Mutation, state: &QueueState) -> Option<Dependency> {
    mutation
        .references()
        .into_iter()
        .find(|reference| is_local_id(reference))
        .map(|reference| {
            if state.queue.contains(reference) || state.dead_letters.contains(reference) {
                Dependency::Pending(reference.to_string())
            } else {
                Dependency::Unknown(reference.to_string())
            }
        })
}
