use anyhow::{Context, Result};

use crate::app::App;
use crate::render::terminal::render_dead_letter;
use crate::OutputFormat;

pub fn run(app: &App, retry: bool, format: &OutputFormat, use_color: bool) -> Result<()> {
    if retry {
        let count = app
            .queue
            .retry_dead_letters()
            .context("Failed to requeue dead letters")?;
        match format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "requeued": count })),
            OutputFormat::Plain => println!("Requeued {} mutation(s)", count),
        }
        return Ok(());
    }

    let letters = app.queue.dead_letters();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&letters)?),
        OutputFormat::Plain => {
            if letters.is_empty() {
                println!("No dead letters.");
                return Ok(());
            }
            for letter in &letters {
                println!("{}", render_dead_letter(letter, use_color));
            }
            println!("\n{} dead-lettered, run with --retry to requeue", letters.len());
        }
    }

    Ok(())
}
