use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::models::{DeadLetter, PendingMutation};
use crate::storage::{load_json, save_json, KeyValueStore, StorageError};

/// Storage key of the pending mutation list
pub const QUEUE_STORAGE_KEY: &str = "offline_actions";
/// Storage key of the persisted local → remote id map
pub const ID_MAP_STORAGE_KEY: &str = "offline_id_map";
/// Storage key of mutations that failed permanently
pub const DEAD_LETTER_STORAGE_KEY: &str = "offline_dead_letters";

/// Ordered list of pending mutations, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionQueue {
    items: VecDeque<PendingMutation>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load queue from the store (empty if never saved)
    pub fn load(store: &dyn KeyValueStore) -> Result<Self, StorageError> {
        Ok(load_json(store, QUEUE_STORAGE_KEY)?.unwrap_or_default())
    }

    /// Rewrite the whole persisted queue
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        save_json(store, QUEUE_STORAGE_KEY, self)
    }

    pub fn push(&mut self, entry: PendingMutation) {
        self.items.push_back(entry);
    }

    pub fn front(&self) -> Option<&PendingMutation> {
        self.items.front()
    }

    /// Remove an entry wherever it sits in the queue
    pub fn remove(&mut self, local_id: &str) -> Option<PendingMutation> {
        let index = self.items.iter().position(|item| item.local_id == local_id)?;
        self.items.remove(index)
    }

    pub fn contains(&self, local_id: &str) -> bool {
        self.items.iter().any(|item| item.local_id == local_id)
    }

    pub fn get_mut(&mut self, local_id: &str) -> Option<&mut PendingMutation> {
        self.items.iter_mut().find(|item| item.local_id == local_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingMutation> {
        self.items.iter()
    }
}

/// Mutations removed from rotation, newest last
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeadLetters {
    items: Vec<DeadLetter>,
}

impl DeadLetters {
    pub fn load(store: &dyn KeyValueStore) -> Result<Self, StorageError> {
        Ok(load_json(store, DEAD_LETTER_STORAGE_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        save_json(store, DEAD_LETTER_STORAGE_KEY, self)
    }

    pub fn push(&mut self, letter: DeadLetter) {
        self.items.push(letter);
    }

    pub fn contains(&self, local_id: &str) -> bool {
        self.items.iter().any(|letter| letter.entry.local_id == local_id)
    }

    pub fn take_all(&mut self) -> Vec<DeadLetter> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeadLetter> {
        self.items.iter()
    }
}

/// Every id referenced by a queued or dead-lettered mutation
pub fn referenced_ids<'a>(queue: &'a ActionQueue, dead_letters: &'a DeadLetters) -> HashSet<&'a str> {
    queue
        .iter()
        .chain(dead_letters.iter().map(|letter| &letter.entry))
        .flat_map(|entry| entry.mutation.references())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::models::{AssetPayload, FolderPayload, Mutation};
    use crate::storage::MemoryKvStore;

    fn entry(local_id: &str, name: &str) -> PendingMutation {
        PendingMutation::new(
            local_id.to_string(),
            "P1".to_string(),
            Mutation::CreateFolder(FolderPayload {
                name: name.to_string(),
                project_id: "P1".to_string(),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_load_empty_store() {
        let store = MemoryKvStore::new();
        let queue = ActionQueue::load(&store).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_save_and_load_preserves_order() {
        let store = MemoryKvStore::new();
        let mut queue = ActionQueue::new();
        queue.push(entry("local_1", "Roof"));
        queue.push(entry("local_2", "Walls"));
        queue.push(entry("local_3", "Floor"));
        queue.save(&store).unwrap();

        let loaded = ActionQueue::load(&store).unwrap();
        let ids: Vec<&str> = loaded.iter().map(|e| e.local_id.as_str()).collect();
        assert_eq!(ids, vec!["local_1", "local_2", "local_3"]);

        // Stored as a bare list
        let raw = store.get(QUEUE_STORAGE_KEY).unwrap().unwrap();
        assert!(raw.starts_with('['));
    }

    #[test]
    fn test_remove_by_id() {
        let mut queue = ActionQueue::new();
        queue.push(entry("local_1", "Roof"));
        queue.push(entry("local_2", "Walls"));

        let removed = queue.remove("local_2").unwrap();
        assert_eq!(removed.local_id, "local_2");
        assert!(queue.remove("local_2").is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front().unwrap().local_id, "local_1");
    }

    #[test]
    fn test_get_mut_edits_in_place() {
        let mut queue = ActionQueue::new();
        queue.push(entry("local_1", "Roof"));
        queue.push(entry("local_2", "Walls"));

        queue.get_mut("local_2").unwrap().attempts = 3;
        assert!(queue.get_mut("local_9").is_none());

        let ids: Vec<(&str, u32)> = queue.iter().map(|e| (e.local_id.as_str(), e.attempts)).collect();
        assert_eq!(ids, vec![("local_1", 0), ("local_2", 3)]);
    }

    #[test]
    fn test_referenced_ids() {
        let mut queue = ActionQueue::new();
        queue.push(PendingMutation::new(
            "local_2".into(),
            "P1".into(),
            Mutation::CreateAsset(AssetPayload {
                name: "Beam".into(),
                project_id: "P1".into(),
                folder_id: Some("local_1".into()),
                ..Default::default()
            }),
        ));
        let dead = DeadLetters::default();

        let ids = referenced_ids(&queue, &dead);
        assert!(ids.contains("local_1"));
        assert_eq!(ids.len(), 1);
    }
}
