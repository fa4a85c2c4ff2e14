//! CLI commands implementation.

use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::models::{ItemType, RunSummary};
use crate::repository::{AnnotationRepository, AsyncSqlitePool};
use crate::scrapers::{ScraperConfig, StdinPrompt};
use crate::services::{HarvestEvent, HarvestService, RunPlan};
use crate::session::SessionStore;
use crate::storage::ParquetSnapshot;

/// Scrape the notebook, or run the login flow when no session exists.
pub async fn cmd_scrape(
    settings: &Settings,
    scraper: &ScraperConfig,
    headed: bool,
) -> anyhow::Result<()> {
    let service = build_service(settings, scraper).await?;

    match service.plan() {
        RunPlan::Bootstrap => {
            println!(
                "{} No usable session found, starting interactive login",
                style("!").yellow()
            );
            run_login(settings, &service).await
        }
        RunPlan::Scrape => run_harvest(&service, headed).await,
    }
}

/// Log in interactively and save the session, replacing any existing one.
pub async fn cmd_login(settings: &Settings, scraper: &ScraperConfig) -> anyhow::Result<()> {
    let service = build_service(settings, scraper).await?;
    run_login(settings, &service).await
}

/// Print store statistics.
pub async fn cmd_stats(settings: &Settings) -> anyhow::Result<()> {
    if !settings.database_exists() {
        println!(
            "{} No database found at {}",
            style("!").yellow(),
            settings.database_path().display()
        );
        println!("  Run `kindle scrape` to harvest annotations first");
        return Ok(());
    }

    let repository = open_repository(settings).await?;

    println!("Database: {}", settings.database_path().display());

    let total = repository.count().await?;
    println!("\nTotal records: {}", total);

    println!("\nRecords by type:");
    let by_type = repository.count_by_type().await?;
    if by_type.is_empty() {
        println!("  none");
    }
    for entry in by_type {
        println!("  - {}: {}", entry.item_type, entry.count);
    }

    for item_type in [ItemType::Highlight, ItemType::Note] {
        println!("\nLast 5 {}s:", item_type.as_str());
        let recent = repository.recent_by_type(item_type, 5).await?;
        if recent.is_empty() {
            println!("  none");
        }
        for record in recent {
            println!(
                "  {} by {}",
                style(&record.book_title).bold(),
                record.book_author
            );
            if !record.content.is_empty() {
                println!("    {}", truncate(&record.content, 100));
            }
            println!(
                "    retrieved {}",
                record.retrieved_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    println!(
        "\nRecords with empty content: {}",
        repository.count_empty_content().await?
    );

    let duplicates = repository.duplicate_key_groups().await?;
    if duplicates > 0 {
        println!(
            "{} Duplicate original_id groups: {}",
            style("✗").red(),
            duplicates
        );
    } else {
        println!("Duplicate original_id groups: 0");
    }

    println!("\nAuthors by distinct books:");
    let authors = repository.authors_by_book_count().await?;
    if authors.is_empty() {
        println!("  none");
    }
    for entry in authors {
        println!("  - {}: {} book(s)", entry.author, entry.books);
    }

    Ok(())
}

/// Rewrite the columnar snapshot from the current table contents.
pub async fn cmd_export(settings: &Settings) -> anyhow::Result<()> {
    if !settings.database_exists() {
        println!(
            "{} No database found at {}",
            style("!").yellow(),
            settings.database_path().display()
        );
        println!("  Run `kindle scrape` to harvest annotations first");
        return Ok(());
    }

    let repository = open_repository(settings).await?;
    let records = repository.get_all().await?;

    let snapshot = ParquetSnapshot::new(settings.parquet_path());
    snapshot.write_all(&records)?;

    println!(
        "{} Wrote {} rows to {}",
        style("✓").green(),
        records.len(),
        settings.parquet_path().display()
    );

    Ok(())
}

async fn build_service(settings: &Settings, scraper: &ScraperConfig) -> anyhow::Result<HarvestService> {
    let repository = open_repository(settings).await?;
    let snapshot = ParquetSnapshot::new(settings.parquet_path());
    let store = SessionStore::new(settings.session_path());

    Ok(HarvestService::new(
        repository,
        snapshot,
        store,
        scraper.clone(),
    ))
}

async fn open_repository(settings: &Settings) -> anyhow::Result<AnnotationRepository> {
    settings.ensure_directories()?;
    let pool = AsyncSqlitePool::from_path(&settings.database_path());
    Ok(AnnotationRepository::open(pool).await?)
}

async fn run_login(settings: &Settings, service: &HarvestService) -> anyhow::Result<()> {
    println!(
        "{} A browser window will open on the notebook page",
        style("→").cyan()
    );

    let prompt = StdinPrompt;
    service.bootstrap(&prompt).await?;

    println!(
        "{} Session saved to {}",
        style("✓").green(),
        settings.session_path().display()
    );
    println!("  Run `kindle scrape` again to harvest annotations");

    Ok(())
}

async fn run_harvest(service: &HarvestService, headed: bool) -> anyhow::Result<()> {
    println!("{} Starting harvest", style("→").cyan());

    let (event_tx, mut event_rx) = mpsc::channel::<HarvestEvent>(100);

    // State for progress bar
    let pb = Arc::new(tokio::sync::Mutex::new(None::<ProgressBar>));
    let pb_clone = pb.clone();

    // Spawn event handler for UI
    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                HarvestEvent::Started { total_books } => {
                    let progress = ProgressBar::new(total_books as u64);
                    progress.set_style(
                        ProgressStyle::default_bar()
                            .template(
                                "{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}",
                            )
                            .unwrap()
                            .progress_chars("█▓░"),
                    );
                    progress.set_message("Opening books...");
                    *pb_clone.lock().await = Some(progress);
                }
                HarvestEvent::BookStarted { title, .. } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.set_message(truncate(&title, 40));
                    }
                }
                HarvestEvent::BookCompleted {
                    title,
                    extracted,
                    skipped,
                    limited,
                } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        if limited {
                            progress.println(format!(
                                "{} {} capped at {} records by the export limit",
                                style("!").yellow(),
                                truncate(&title, 40),
                                extracted
                            ));
                        }
                        if skipped > 0 {
                            progress.println(format!(
                                "{} {} fragment(s) without a stable id in {}",
                                style("!").yellow(),
                                skipped,
                                truncate(&title, 40)
                            ));
                        }
                        progress.inc(1);
                    }
                }
                HarvestEvent::BookFailed { title, error } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.println(format!(
                            "{} {}: {}",
                            style("✗").red(),
                            truncate(&title, 40),
                            error
                        ));
                        progress.inc(1);
                    }
                }
                HarvestEvent::Complete { .. } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.finish_and_clear();
                    }
                    *pb_clone.lock().await = None;
                }
            }
        }
    });

    let summary = service.harvest(!headed, event_tx).await?;

    // Wait for event handler to finish
    let _ = event_handler.await;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} Harvest complete: {} books processed, {} records collected, {} new rows written",
        style("✓").green(),
        summary.books_processed,
        summary.records_collected,
        summary.records_written
    );

    if summary.fragments_skipped > 0 {
        println!(
            "  {} {} fragment(s) skipped for missing a stable id",
            style("!").yellow(),
            summary.fragments_skipped
        );
    }

    if !summary.limited_books.is_empty() {
        println!(
            "  {} Capped by the export limit:",
            style("!").yellow()
        );
        for title in &summary.limited_books {
            println!("    - {}", title);
        }
    }

    if !summary.failed_books.is_empty() {
        println!("  {} Failed to load:", style("✗").red());
        for title in &summary.failed_books {
            println!("    - {}", title);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_strings_untouched() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("", 10), "");
    }

    #[test]
    fn test_truncate_long_strings_get_ellipsis() {
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let quoted = "\u{201C}curly quoted text here\u{201D}";
        let cut = truncate(quoted, 10);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 10);
    }
}
