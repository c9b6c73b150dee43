use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::config::ConfigLoader;
use scorm_core::persistence::ReplayEntry;
use scorm_core::{ReplayQueue, SqliteAttemptBackend};

#[derive(Args)]
pub struct ReplayArgs {
    /// Only list parked snapshots, do not write them
    #[arg(long)]
    pub list: bool,
}

pub async fn run(args: ReplayArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let queue = ReplayQueue::load(&config.persistence.replay_dir).await?;

    if args.list {
        let entries = queue.entries().await;
        if entries.is_empty() {
            println!("Replay queue is empty");
        } else {
            println!("{}", entries_table(&entries));
        }
        return Ok(());
    }

    if queue.is_empty().await {
        println!("Replay queue is empty");
        return Ok(());
    }

    let backend = SqliteAttemptBackend::open(&config.storage.database)?;
    let report = queue.drain(&backend).await?;
    println!(
        "Replayed {}, dropped {}, still pending {}",
        report.replayed, report.dropped, report.failed
    );
    Ok(())
}

fn entries_table(entries: &[ReplayEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Learner").fg(Color::Cyan),
        Cell::new("Package").fg(Color::Cyan),
        Cell::new("Attempt").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
        Cell::new("Queued").fg(Color::Cyan),
    ]);

    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.attempt.user_id),
            Cell::new(&entry.attempt.package_id),
            Cell::new(entry.attempt.attempt_number),
            Cell::new(entry.attempt.status),
            Cell::new(entry.queued_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use scorm_core::{Attempt, ScormVersion};

    #[test]
    fn table_shows_learner_and_package() {
        let entry = ReplayEntry::new(
            "session-1",
            3,
            Attempt::new("learner-7", "course-9", 2, ScormVersion::Scorm2004),
        );
        let rendered = entries_table(&[entry]).to_string();
        assert!(rendered.contains("learner-7"));
        assert!(rendered.contains("course-9"));
    }
}
