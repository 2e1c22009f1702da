mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fieldkit-cli", about = "Offline capture queue for field inspections", version)]
struct Cli {
    /// Config file (default: <config_dir>/fieldkit/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a new folder
    Folder {
        /// Owning project id
        project: String,
        /// Folder name
        name: String,
        /// Parent folder id (remote or local_…)
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Queue a new asset, optionally with a captured media file
    Asset {
        /// Owning project id
        project: String,
        /// Asset name
        name: String,
        /// Folder id (remote or local_…)
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Photo, video, audio or document to upload on sync
        #[arg(long)]
        media: Option<PathBuf>,
    },

    /// Queue changes to an existing asset
    UpdateAsset {
        /// Owning project id
        project: String,
        /// Asset id (remote or local_…)
        asset: String,
        #[arg(long)]
        name: Option<String>,
        /// Move to another folder
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show queued mutations
    Status,

    /// Run one sync pass now
    Sync,

    /// Look up the remote id of a synced local id
    Resolve {
        local_id: String,
    },

    /// List mutations that failed permanently
    DeadLetters {
        /// Move them back into the queue
        #[arg(long)]
        retry: bool,
    },

    /// Stay running and sync whenever the remote is reachable
    Watch {
        /// Seconds between reachability probes
        #[arg(long, default_value = "15")]
        probe_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();
    let app = app::App::new(cli.config.as_deref())?;

    match cli.command {
        Command::Folder {
            project,
            name,
            parent,
            description,
        } => {
            commands::folder::run(&app, &project, name, parent, description, &cli.format)?;
        }
        Command::Asset {
            project,
            name,
            folder,
            notes,
            media,
        } => {
            commands::asset::run_create(
                &app,
                &project,
                name,
                folder,
                notes,
                media.as_deref(),
                &cli.format,
            )?;
        }
        Command::UpdateAsset {
            project,
            asset,
            name,
            folder,
            notes,
        } => {
            commands::asset::run_update(&app, &project, asset, name, folder, notes, &cli.format)?;
        }
        Command::Status => {
            commands::status::run(&app, &cli.format, use_color)?;
        }
        Command::Sync => {
            commands::sync::run(&app, &cli.format, use_color).await?;
        }
        Command::Resolve { local_id } => {
            commands::status::run_resolve(&app, &local_id, &cli.format)?;
        }
        Command::DeadLetters { retry } => {
            commands::dead_letters::run(&app, retry, &cli.format, use_color)?;
        }
        Command::Watch { probe_interval } => {
            commands::watch::run(&app, probe_interval).await?;
        }
    }

    Ok(())
}
