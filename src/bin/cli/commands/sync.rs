use anyhow::{Context, Result};

use crate::app::App;
use crate::render::terminal::render_report;
use crate::OutputFormat;

pub async fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let report = app.queue.sync().await.context("Sync failed")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => println!("{}", render_report(&report, use_color)),
    }

    Ok(())
}
