use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::config::ConfigLoader;
use scorm_core::{Attempt, AttemptBackend, SqliteAttemptBackend};

#[derive(Args)]
pub struct AttemptArgs {
    /// Learner id
    #[arg(long)]
    pub user: String,

    /// Package id
    #[arg(long)]
    pub package: String,

    /// List every attempt instead of printing the latest as JSON
    #[arg(long)]
    pub all: bool,
}

pub async fn run(args: AttemptArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let backend = SqliteAttemptBackend::open(&config.storage.database)?;

    if args.all {
        let attempts = backend.list_attempts(&args.user, &args.package)?;
        if attempts.is_empty() {
            println!("No attempts for {} on {}", args.user, args.package);
        } else {
            println!("{}", attempts_table(&attempts));
        }
        return Ok(());
    }

    match backend.get_latest_attempt(&args.user, &args.package).await? {
        Some(attempt) => println!("{}", serde_json::to_string_pretty(&attempt)?),
        None => println!("No attempts for {} on {}", args.user, args.package),
    }
    Ok(())
}

fn attempts_table(attempts: &[Attempt]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::Cyan),
        Cell::new("Id").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
        Cell::new("Score").fg(Color::Cyan),
        Cell::new("Time").fg(Color::Cyan),
        Cell::new("Open").fg(Color::Cyan),
        Cell::new("Last accessed").fg(Color::Cyan),
    ]);

    for attempt in attempts {
        let score = attempt
            .score_raw
            .map(|raw| raw.to_string())
            .unwrap_or_else(|| "-".to_string());
        let open = if attempt.is_terminated() { "no" } else { "yes" };
        table.add_row(vec![
            Cell::new(attempt.attempt_number),
            Cell::new(&attempt.id),
            Cell::new(attempt.status),
            Cell::new(score),
            Cell::new(format_centis(attempt.total_time_centis)),
            Cell::new(open),
            Cell::new(attempt.last_accessed_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    table
}

/// Render hundredths of a second as `h:mm:ss`
fn format_centis(centis: u64) -> String {
    let seconds = centis / 100;
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
