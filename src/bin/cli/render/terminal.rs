use fieldkit_lib::offline::{DeadLetter, Mutation, PendingMutation, SyncReport};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// Short human description of a mutation
pub fn describe(mutation: &Mutation) -> String {
    match mutation {
        Mutation::CreateFolder(folder) => match &folder.parent_folder_id {
            Some(parent) => format!("folder \"{}\" in {}", folder.name, parent),
            None => format!("folder \"{}\"", folder.name),
        },
        Mutation::CreateAsset(asset) => {
            let mut line = format!("asset \"{}\"", asset.name);
            if let Some(folder_id) = &asset.folder_id {
                line.push_str(&format!(" in {}", folder_id));
            }
            if let Some(media) = &asset.pending_media {
                line.push_str(&format!(" + {}", media.file_name));
            }
            line
        }
        Mutation::UpdateAsset(update) => format!("update asset {}", update.asset_id),
    }
}

/// One line per queued mutation
pub fn render_pending(entry: &PendingMutation, use_color: bool) -> String {
    let mut line = format!(
        "{} {:<13} {} {}",
        paint(&entry.local_id, Color::CYAN, use_color),
        entry.mutation.kind(),
        describe(&entry.mutation),
        paint(&format!("[{}]", entry.project_id), Color::GRAY, use_color),
    );
    if entry.attempts > 0 {
        let error = entry.last_error.as_deref().unwrap_or("unknown error");
        line.push_str(&paint(
            &format!("  ({} failed: {})", entry.attempts, error),
            Color::YELLOW,
            use_color,
        ));
    } else if let Some(note) = &entry.last_error {
        line.push_str(&paint(&format!("  ({})", note), Color::DIM, use_color));
    }
    line
}

pub fn render_dead_letter(letter: &DeadLetter, use_color: bool) -> String {
    format!(
        "{} {:<13} {}\n    {} {}",
        paint(&letter.entry.local_id, Color::CYAN, use_color),
        letter.entry.mutation.kind(),
        describe(&letter.entry.mutation),
        paint(&letter.failed_at.format("%Y-%m-%d %H:%M").to_string(), Color::GRAY, use_color),
        paint(&letter.reason, Color::RED, use_color),
    )
}

pub fn render_report(report: &SyncReport, use_color: bool) -> String {
    if report.skipped {
        return paint("Sync already in progress, skipped.", Color::YELLOW, use_color);
    }

    let mut lines = vec![format!(
        "{} synced, {} left in queue ({} waiting on dependencies), {} dead-lettered",
        paint(&report.synced_count.to_string(), Color::GREEN, use_color),
        paint(
            &report.error_count.to_string(),
            if report.error_count > 0 { Color::YELLOW } else { Color::RESET },
            use_color
        ),
        report.blocked_count,
        paint(
            &report.dead_lettered.to_string(),
            if report.dead_lettered > 0 { Color::RED } else { Color::RESET },
            use_color
        ),
    )];
    for (local_id, remote_id) in &report.remapped {
        lines.push(format!("  {} -> {}", local_id, paint(remote_id, Color::BOLD, use_color)));
    }
    lines.join("\n")
}
