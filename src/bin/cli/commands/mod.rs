pub mod asset;
pub mod dead_letters;
pub mod folder;
pub mod status;
pub mod sync;
pub mod watch;

use anyhow::Result;

use crate::app::App;
use crate::OutputFormat;

/// Report a freshly queued mutation
fn print_queued(app: &App, local_id: &str, format: &OutputFormat) -> Result<()> {
    let queue_length = app.queue.queue_length();
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "localId": local_id,
                "queueLength": queue_length,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Queued {} ({} pending)", local_id, queue_length);
        }
    }
    Ok(())
}
