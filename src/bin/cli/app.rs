use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use fieldkit_lib::config::FieldkitConfig;
use fieldkit_lib::offline::{MediaType, OfflineQueue, PendingMedia};
use fieldkit_lib::remote::{HttpDocumentStore, HttpMediaUploader};
use fieldkit_lib::storage::FileKvStore;

/// Shared application state for CLI commands
pub struct App {
    pub config: FieldkitConfig,
    pub data_dir: PathBuf,
    pub remote: Arc<HttpDocumentStore>,
    pub queue: Arc<OfflineQueue>,
}

impl App {
    /// Load config and open the queue stored under the data directory
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = FieldkitConfig::load(config_path).context("Failed to load config")?;
        let data_dir = config.resolve_data_dir().context("Failed to get data directory")?;

        let store = FileKvStore::new(data_dir.clone())
            .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;

        let remote = Arc::new(
            HttpDocumentStore::new(&config.remote.base_url, config.remote.api_token.clone(), config.timeout())
                .context("Failed to create document store client")?,
        );

        let mut queue = OfflineQueue::open(Arc::new(store), remote.clone())
            .context("Failed to open offline queue")?
            .with_retry_policy(config.retry_policy());

        if let Some(media_url) = &config.remote.media_url {
            let uploader = HttpMediaUploader::new(media_url, config.remote.api_token.clone(), config.timeout())
                .context("Failed to create media client")?;
            queue = queue.with_media_uploader(Arc::new(uploader));
        }

        Ok(Self {
            config,
            data_dir,
            remote,
            queue: Arc::new(queue),
        })
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    /// Copy a captured file into the data directory so it outlives the original
    pub fn stage_media(&self, source: &Path) -> Result<(PendingMedia, MediaType)> {
        if !source.is_file() {
            bail!("Media file not found: {}", source.display());
        }
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("Media path has no file name")?;

        let media_dir = self.media_dir();
        std::fs::create_dir_all(&media_dir)
            .with_context(|| format!("Failed to create {}", media_dir.display()))?;

        let local_path = media_dir.join(format!("{}-{}", Uuid::new_v4().simple(), file_name));
        std::fs::copy(source, &local_path)
            .with_context(|| format!("Failed to copy {} into {}", source.display(), media_dir.display()))?;

        let (content_type, media_type) = guess_content_type(&file_name);
        log::debug!("Staged {} as {}", source.display(), local_path.display());

        Ok((
            PendingMedia {
                file_name,
                content_type: content_type.to_string(),
                local_path,
            },
            media_type,
        ))
    }
}

/// Content type and media kind from a file extension
fn guess_content_type(file_name: &str) -> (&'static str, MediaType) {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => ("image/jpeg", MediaType::Photo),
        "png" => ("image/png", MediaType::Photo),
        "heic" => ("image/heic", MediaType::Photo),
        "webp" => ("image/webp", MediaType::Photo),
        "mp4" => ("video/mp4", MediaType::Video),
        "mov" => ("video/quicktime", MediaType::Video),
        "m4a" => ("audio/mp4", MediaType::Audio),
        "mp3" => ("audio/mpeg", MediaType::Audio),
        "wav" => ("audio/wav", MediaType::Audio),
        "pdf" => ("application/pdf", MediaType::Document),
        _ => ("application/octet-stream", MediaType::Document),
    }
}
