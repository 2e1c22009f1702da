//! Remote collaborators: the cloud document store and the media upload service.

mod client;

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use client::{HttpDocumentStore, HttpMediaUploader, RemoteError};

/// Document collections written by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Projects,
    Folders,
    Assets,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Folders => "folders",
            Collection::Assets => "assets",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote document store keyed by collection and document id.
///
/// A failed call is assumed not to have taken effect remotely.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document and return the id assigned by the store
    async fn create(&self, collection: Collection, document: Value) -> Result<String, RemoteError>;

    /// Merge `document` into an existing document
    async fn update(&self, collection: Collection, id: &str, document: Value) -> Result<(), RemoteError>;

    /// Mark a project as having recent activity
    async fn touch_project(&self, project_id: &str) -> Result<(), RemoteError> {
        let document = serde_json::json!({
            "lastActivityAt": Utc::now(),
            "lastActivityDevice": device_name(),
        });
        self.update(Collection::Projects, project_id, document).await
    }
}

/// Media upload service: stores a blob and returns a stable URL
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file_name: &str, content_type: &str, data: Vec<u8>) -> Result<String, RemoteError>;
}

fn device_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
