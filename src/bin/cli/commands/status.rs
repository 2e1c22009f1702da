use anyhow::Result;

use crate::app::App;
use crate::render::terminal::render_pending;
use crate::OutputFormat;

pub fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let pending = app.queue.pending();
    let dead_letters = app.queue.dead_letters().len();

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "remote": app.remote.base_url(),
                "queueLength": pending.len(),
                "deadLetters": dead_letters,
                "pending": pending,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Remote: {}", app.remote.base_url());
            if pending.is_empty() {
                println!("Queue is empty.");
            } else {
                for entry in &pending {
                    println!("{}", render_pending(entry, use_color));
                }
                println!("\n{} pending", pending.len());
            }
            if dead_letters > 0 {
                println!("{} dead-lettered (see `dead-letters`)", dead_letters);
            }
        }
    }

    Ok(())
}

pub fn run_resolve(app: &App, local_id: &str, format: &OutputFormat) -> Result<()> {
    let remote_id = app.queue.resolve(local_id);

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "localId": local_id,
                "remoteId": remote_id,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => match remote_id {
            Some(remote_id) => println!("{}", remote_id),
            None => println!("{} has not been synced (or is no longer tracked)", local_id),
        },
    }

    Ok(())
}
