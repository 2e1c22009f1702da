use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::LocalId;
use super::remap::IdMap;
use crate::remote::Collection;

/// Presentation-only flags callers sometimes leave on payloads.
/// Keys starting with `_` are treated the same way.
const TRANSIENT_FIELDS: &[&str] = &[
    "isPending",
    "isSyncing",
    "isUploading",
    "isOptimistic",
    "localPreview",
    "previewUrl",
    "uploadProgress",
    "selected",
];

/// Kind of captured media attached to an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
    Audio,
    Document,
}

/// A captured blob on local disk waiting for upload.
///
/// The queue owns the file at `local_path`: it is deleted once the upload
/// has been recorded on the queued entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMedia {
    pub file_name: String,
    pub content_type: String,
    pub local_path: PathBuf,
}

/// Fields of a new folder document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderPayload {
    pub name: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Additional document fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields of a new asset document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPayload {
    pub name: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Uploaded before the document is created; never sent to the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_media: Option<PendingMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Partial update of an existing asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetUpdate {
    /// Target asset; may be a local id if the asset was created offline
    pub asset_id: String,
    pub changes: AssetPatch,
}

/// A queued write against the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum Mutation {
    CreateFolder(FolderPayload),
    CreateAsset(AssetPayload),
    UpdateAsset(AssetUpdate),
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::CreateFolder(_) => "createFolder",
            Mutation::CreateAsset(_) => "createAsset",
            Mutation::UpdateAsset(_) => "updateAsset",
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            Mutation::CreateFolder(_) => Collection::Folders,
            Mutation::CreateAsset(_) | Mutation::UpdateAsset(_) => Collection::Assets,
        }
    }

    /// Ids of other entities this mutation points at
    pub fn references(&self) -> Vec<&str> {
        match self {
            Mutation::CreateFolder(folder) => folder.parent_folder_id.as_deref().into_iter().collect(),
            Mutation::CreateAsset(asset) => asset.folder_id.as_deref().into_iter().collect(),
            Mutation::UpdateAsset(update) => std::iter::once(update.asset_id.as_str())
                .chain(update.changes.folder_id.as_deref())
                .collect(),
        }
    }

    /// Replace every reference that has a remote mapping.
    /// Returns how many fields were rewritten.
    pub fn rewrite_references(&mut self, id_map: &IdMap) -> usize {
        let mut rewritten = 0;
        let mut rewrite = |field: &mut String| {
            if let Some(remote_id) = id_map.resolve(field) {
                *field = remote_id.to_string();
                rewritten += 1;
            }
        };

        match self {
            Mutation::CreateFolder(folder) => {
                if let Some(parent) = folder.parent_folder_id.as_mut() {
                    rewrite(parent);
                }
            }
            Mutation::CreateAsset(asset) => {
                if let Some(folder_id) = asset.folder_id.as_mut() {
                    rewrite(folder_id);
                }
            }
            Mutation::UpdateAsset(update) => {
                rewrite(&mut update.asset_id);
                if let Some(folder_id) = update.changes.folder_id.as_mut() {
                    rewrite(folder_id);
                }
            }
        }
        rewritten
    }

    /// Remove presentation-only flags. Returns the removed keys.
    pub fn strip_transient_flags(&mut self) -> Vec<String> {
        let extra = match self {
            Mutation::CreateFolder(folder) => &mut folder.extra,
            Mutation::CreateAsset(asset) => &mut asset.extra,
            Mutation::UpdateAsset(update) => &mut update.changes.extra,
        };

        let transient: Vec<String> = extra
            .keys()
            .filter(|key| key.starts_with('_') || TRANSIENT_FIELDS.contains(&key.as_str()))
            .cloned()
            .collect();
        for key in &transient {
            extra.remove(key);
        }
        transient
    }

    /// Document body sent to the remote store
    pub fn to_document(&self) -> serde_json::Result<Value> {
        match self {
            Mutation::CreateFolder(folder) => serde_json::to_value(folder),
            Mutation::CreateAsset(asset) => {
                let mut document = serde_json::to_value(asset)?;
                if let Value::Object(fields) = &mut document {
                    fields.remove("pendingMedia");
                }
                Ok(document)
            }
            Mutation::UpdateAsset(update) => serde_json::to_value(&update.changes),
        }
    }
}

/// An entry of the offline queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    pub local_id: LocalId,
    /// Owning project
    pub project_id: String,
    pub mutation: Mutation,
    pub queued_at: DateTime<Utc>,
    /// Number of failed submissions
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PendingMutation {
    pub fn new(local_id: LocalId, project_id: String, mutation: Mutation) -> Self {
        Self {
            local_id,
            project_id,
            mutation,
            queued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }
}

/// A mutation taken out of rotation after a permanent failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub entry: PendingMutation,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced_count: usize,
    /// Entries left in the queue for a later pass (includes `blocked_count`)
    pub error_count: usize,
    /// Entries not submitted because a dependency is still queued
    pub blocked_count: usize,
    pub dead_lettered: usize,
    /// Local ids resolved during this pass
    pub remapped: Vec<(LocalId, String)>,
    /// True when the call was dropped because another pass was running
    pub skipped: bool,
}

impl SyncReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    /// Whether the pass moved anything out of the queue
    pub fn made_progress(&self) -> bool {
        self.synced_count > 0 || self.dead_lettered > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn folder(name: &str) -> Mutation {
        Mutation::CreateFolder(FolderPayload {
            name: name.to_string(),
            project_id: "P1".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_serialized_shape() {
        let entry = PendingMutation::new("local_1".to_string(), "P1".to_string(), folder("Roof"));
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["localId"], "local_1");
        assert_eq!(value["projectId"], "P1");
        assert_eq!(value["mutation"]["kind"], "createFolder");
        assert_eq!(value["mutation"]["payload"]["name"], "Roof");
        assert!(value.get("lastError").is_none());

        let back: PendingMutation = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_extra_fields_are_kept() {
        let value = json!({
            "kind": "createAsset",
            "payload": {
                "name": "Beam",
                "projectId": "P1",
                "folderId": "local_f",
                "inspector": "dana",
                "severity": 3
            }
        });
        let mutation: Mutation = serde_json::from_value(value).unwrap();
        let Mutation::CreateAsset(asset) = &mutation else {
            panic!("expected createAsset");
        };
        assert_eq!(asset.folder_id.as_deref(), Some("local_f"));
        assert_eq!(asset.extra["inspector"], "dana");
        assert_eq!(asset.extra["severity"], 3);
    }

    #[test]
    fn test_strip_transient_flags() {
        let mut extra = Map::new();
        extra.insert("isUploading".into(), json!(true));
        extra.insert("_optimisticKey".into(), json!("x"));
        extra.insert("localPreview".into(), json!("blob:123"));
        extra.insert("inspector".into(), json!("dana"));

        let mut mutation = Mutation::CreateAsset(AssetPayload {
            name: "Beam".into(),
            project_id: "P1".into(),
            extra,
            ..Default::default()
        });

        let mut removed = mutation.strip_transient_flags();
        removed.sort();
        assert_eq!(removed, vec!["_optimisticKey", "isUploading", "localPreview"]);

        let Mutation::CreateAsset(asset) = &mutation else { unreachable!() };
        assert_eq!(asset.extra.len(), 1);
        assert!(asset.extra.contains_key("inspector"));
    }

    #[test]
    fn test_rewrite_references() {
        let mut map = IdMap::new();
        map.insert("local_f".into(), "F100".into());
        map.insert("local_a".into(), "A200".into());

        let mut update = Mutation::UpdateAsset(AssetUpdate {
            asset_id: "local_a".into(),
            changes: AssetPatch {
                folder_id: Some("local_f".into()),
                ..Default::default()
            },
        });
        assert_eq!(update.rewrite_references(&map), 2);
        assert_eq!(update.references(), vec!["A200", "F100"]);

        let mut unrelated = Mutation::CreateAsset(AssetPayload {
            name: "Beam".into(),
            project_id: "P1".into(),
            folder_id: Some("F7".into()),
            ..Default::default()
        });
        assert_eq!(unrelated.rewrite_references(&map), 0);
        assert_eq!(unrelated.references(), vec!["F7"]);
    }

    #[test]
    fn test_document_omits_pending_media() {
        let mutation = Mutation::CreateAsset(AssetPayload {
            name: "Beam".into(),
            project_id: "P1".into(),
            media_type: Some(MediaType::Photo),
            media_url: Some("https://media.example.com/1.jpg".into()),
            pending_media: Some(PendingMedia {
                file_name: "1.jpg".into(),
                content_type: "image/jpeg".into(),
                local_path: PathBuf::from("/tmp/1.jpg"),
            }),
            ..Default::default()
        });

        let document = mutation.to_document().unwrap();
        assert!(document.get("pendingMedia").is_none());
        assert_eq!(document["mediaType"], "photo");
        assert_eq!(document["mediaUrl"], "https://media.example.com/1.jpg");
    }

    #[test]
    fn test_update_document_is_the_patch() {
        let mutation = Mutation::UpdateAsset(AssetUpdate {
            asset_id: "A1".into(),
            changes: AssetPatch {
                notes: Some("cracked".into()),
                ..Default::default()
            },
        });
        assert_eq!(mutation.to_document().unwrap(), json!({ "notes": "cracked" }));
        assert_eq!(mutation.collection(), Collection::Assets);
    }
}
