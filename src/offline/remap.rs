use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{LocalId, RemoteId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedId {
    pub remote_id: RemoteId,
    pub resolved_at: DateTime<Utc>,
}

/// Local → remote id map for creates that have reached the remote store.
///
/// Persisted between sync passes so a mutation that depends on an entity
/// created in an earlier pass can still be rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMap {
    entries: BTreeMap<LocalId, MappedId>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, local_id: LocalId, remote_id: RemoteId) {
        self.insert_at(local_id, remote_id, Utc::now());
    }

    pub fn insert_at(&mut self, local_id: LocalId, remote_id: RemoteId, resolved_at: DateTime<Utc>) {
        self.entries.insert(local_id, MappedId { remote_id, resolved_at });
    }

    pub fn resolve(&self, local_id: &str) -> Option<&str> {
        self.entries.get(local_id).map(|mapped| mapped.remote_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop mappings that no pending mutation references and that were
    /// resolved before `cutoff`. Returns the number of entries removed.
    pub fn retain_live(&mut self, referenced: &HashSet<&str>, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|local_id, mapped| {
            referenced.contains(local_id.as_str()) || mapped.resolved_at > cutoff
        });
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocalId, &MappedId)> {
        self.entries.iter()
    }
}
