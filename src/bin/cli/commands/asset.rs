use std::path::Path;

use anyhow::{bail, Context, Result};

use fieldkit_lib::offline::{AssetPatch, AssetPayload, AssetUpdate, Mutation};

use crate::app::App;
use crate::OutputFormat;

pub fn run_create(
    app: &App,
    project: &str,
    name: String,
    folder: Option<String>,
    notes: Option<String>,
    media: Option<&Path>,
    format: &OutputFormat,
) -> Result<()> {
    let mut payload = AssetPayload {
        name,
        project_id: project.to_string(),
        folder_id: folder,
        notes,
        ..Default::default()
    };

    if let Some(source) = media {
        if app.config.remote.media_url.is_none() {
            log::warn!("No media service configured; {} will wait in the queue until one is", source.display());
        }
        let (pending, media_type) = app.stage_media(source)?;
        payload.media_type = Some(media_type);
        payload.pending_media = Some(pending);
    }

    let local_id = app
        .queue
        .enqueue(Mutation::CreateAsset(payload), project)
        .context("Failed to queue asset")?;

    super::print_queued(app, &local_id, format)
}

pub fn run_update(
    app: &App,
    project: &str,
    asset_id: String,
    name: Option<String>,
    folder: Option<String>,
    notes: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    if name.is_none() && folder.is_none() && notes.is_none() {
        bail!("Nothing to update: pass at least one of --name, --folder, --notes");
    }

    let mutation = Mutation::UpdateAsset(AssetUpdate {
        asset_id,
        changes: AssetPatch {
            name,
            folder_id: folder,
            notes,
            ..Default::default()
        },
    });

    let local_id = app
        .queue
        .enqueue(mutation, project)
        .context("Failed to queue asset update")?;

    super::print_queued(app, &local_id, format)
}
