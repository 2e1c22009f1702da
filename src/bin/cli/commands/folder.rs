use anyhow::{Context, Result};

use fieldkit_lib::offline::{FolderPayload, Mutation};

use crate::app::App;
use crate::OutputFormat;

pub fn run(
    app: &App,
    project: &str,
    name: String,
    parent: Option<String>,
    description: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let mutation = Mutation::CreateFolder(FolderPayload {
        name,
        project_id: project.to_string(),
        parent_folder_id: parent,
        description,
        ..Default::default()
    });

    let local_id = app
        .queue
        .enqueue(mutation, project)
        .context("Failed to queue folder")?;

    super::print_queued(app, &local_id, format)
}
