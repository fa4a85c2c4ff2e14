//! Notebook harvest service.
//!
//! Drives a full run end to end: restore the saved session, walk the
//! library book by book, extract annotations, and persist the results.
//! Separated from UI concerns - emits events for progress tracking.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::{AnnotationRecord, BookExportStatus, RunSummary};
use crate::repository::AnnotationRepository;
use crate::scrapers::{
    extract, fragment, AnnotationExtractor, BookSource, OperatorPrompt, ScrapeError, ScraperConfig,
};
use crate::session::{SessionState, SessionStore};
use crate::storage::ParquetSnapshot;

#[cfg(feature = "browser")]
use crate::scrapers::browser::NotebookNavigator;

/// Events emitted during a harvest run.
#[derive(Debug, Clone)]
pub enum HarvestEvent {
    /// Library enumerated; the run will visit this many books
    Started { total_books: usize },
    /// One book's detail pane is being opened
    BookStarted {
        index: usize,
        total: usize,
        title: String,
    },
    /// One book's annotations were extracted
    BookCompleted {
        title: String,
        extracted: usize,
        skipped: usize,
        limited: bool,
    },
    /// One book's detail pane never rendered
    BookFailed { title: String, error: String },
    /// All books visited and both stores written
    Complete { collected: usize, written: usize },
}

/// What the next run should do, decided from the stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPlan {
    /// No usable session: open a visible browser and capture a login.
    Bootstrap,
    /// Usable session on disk: scrape headlessly.
    Scrape,
}

/// Decide a run's mode from the session state on disk.
pub fn plan_run(state: Option<&SessionState>, now: DateTime<Utc>) -> RunPlan {
    match state {
        Some(state) if state.is_usable(now) => RunPlan::Scrape,
        _ => RunPlan::Bootstrap,
    }
}

/// Service for harvesting notebook annotations into the local stores.
pub struct HarvestService {
    repository: AnnotationRepository,
    snapshot: ParquetSnapshot,
    store: SessionStore,
    scraper: ScraperConfig,
}

impl HarvestService {
    /// Create a new harvest service.
    pub fn new(
        repository: AnnotationRepository,
        snapshot: ParquetSnapshot,
        store: SessionStore,
        scraper: ScraperConfig,
    ) -> Self {
        Self {
            repository,
            snapshot,
            store,
            scraper,
        }
    }

    /// Decide what the next run should do from the session on disk.
    pub fn plan(&self) -> RunPlan {
        plan_run(self.store.load().as_ref(), Utc::now())
    }

    /// Run the interactive login flow and save the captured session.
    ///
    /// The operator logs in through a visible browser window; the session
    /// lands on disk for the next run to pick up.
    pub async fn bootstrap(&self, prompt: &dyn OperatorPrompt) -> anyhow::Result<()> {
        #[cfg(feature = "browser")]
        {
            // Clear any stale session before capturing a new one
            self.store.remove();

            let state = NotebookNavigator::bootstrap(&self.scraper, prompt).await?;
            self.store
                .save(&state)
                .context("Failed to save the captured session")?;
            Ok(())
        }
        #[cfg(not(feature = "browser"))]
        {
            let _ = prompt;
            Err(anyhow::anyhow!(
                "Browser support not compiled. Rebuild with: cargo build --features browser"
            ))
        }
    }

    /// Restore the saved session and harvest the live notebook page.
    ///
    /// The browser is closed before any error is surfaced.
    pub async fn harvest(
        &self,
        headless: bool,
        event_tx: mpsc::Sender<HarvestEvent>,
    ) -> anyhow::Result<RunSummary> {
        #[cfg(feature = "browser")]
        {
            let state = self
                .store
                .load()
                .context("No usable session on disk; complete the login bootstrap first")?;

            let navigator = NotebookNavigator::launch(&self.scraper, headless).await?;
            navigator.restore_session(&state).await;
            let result = match navigator.goto_notebook().await {
                Ok(()) => self.harvest_from(&navigator, &event_tx).await,
                Err(e) => Err(e.into()),
            };
            navigator.close().await;
            result
        }
        #[cfg(not(feature = "browser"))]
        {
            let _ = (headless, event_tx);
            Err(anyhow::anyhow!(
                "Browser support not compiled. Rebuild with: cargo build --features browser"
            ))
        }
    }

    /// Walk every book a source lists and persist the collected records.
    ///
    /// Each book is contained: a pane that never renders marks the book
    /// failed and the run moves on. Errors that take the source itself
    /// down abort the run.
    pub async fn harvest_from(
        &self,
        source: &dyn BookSource,
        event_tx: &mpsc::Sender<HarvestEvent>,
    ) -> anyhow::Result<RunSummary> {
        let (records, mut summary) = self.scrape_books(source, event_tx).await?;

        summary.records_written = self
            .repository
            .insert_ignoring_duplicates(&records)
            .await
            .context("Failed to write records to the database")?;

        let all = self
            .repository
            .get_all()
            .await
            .context("Failed to read records back for the snapshot")?;
        self.snapshot
            .write_all(&all)
            .context("Failed to write the columnar snapshot")?;

        let _ = event_tx
            .send(HarvestEvent::Complete {
                collected: summary.records_collected,
                written: summary.records_written,
            })
            .await;

        Ok(summary)
    }

    async fn scrape_books(
        &self,
        source: &dyn BookSource,
        event_tx: &mpsc::Sender<HarvestEvent>,
    ) -> Result<(Vec<AnnotationRecord>, RunSummary), ScrapeError> {
        let books = source.enumerate_books().await?;
        let total = books.len();
        let _ = event_tx
            .send(HarvestEvent::Started { total_books: total })
            .await;

        let extractor = AnnotationExtractor::new(&self.scraper);
        let mut records = Vec::new();
        let mut summary = RunSummary::default();

        for book in &books {
            let _ = event_tx
                .send(HarvestEvent::BookStarted {
                    index: book.index,
                    total,
                    title: book.title.clone(),
                })
                .await;

            let mut status = BookExportStatus::new(book.title.clone());

            match source.open_book(book.index).await {
                Ok(Some(page)) => {
                    let author = resolve_author(
                        &page.html,
                        &book.author,
                        &self.scraper.selectors.book_author_detail,
                    );
                    let extraction =
                        extractor.extract_page(&page.html, &book.title, &author, &book.asin);
                    status.extracted = extraction.records.len();
                    status.skipped = extraction.skipped;
                    status.limited = extraction.limited;
                    records.extend(extraction.records);

                    let _ = event_tx
                        .send(HarvestEvent::BookCompleted {
                            title: book.title.clone(),
                            extracted: status.extracted,
                            skipped: status.skipped,
                            limited: status.limited,
                        })
                        .await;
                }
                Ok(None) => {
                    warn!(
                        "Library list no longer reaches index {}; stopping early",
                        book.index
                    );
                    break;
                }
                Err(e @ ScrapeError::NavigationTimeout { .. }) => {
                    warn!("Annotations for {:?} never rendered: {}", book.title, e);
                    status.failed_to_load = true;
                    let _ = event_tx
                        .send(HarvestEvent::BookFailed {
                            title: book.title.clone(),
                            error: e.to_string(),
                        })
                        .await;
                }
                Err(e) => return Err(e),
            }

            summary.record_book(&status);

            // Pace navigation between books
            let pace_ms = self.scraper.timeouts.book_pace_ms;
            let jitter = rand::rng().random_range(0..=pace_ms);
            tokio::time::sleep(Duration::from_millis(pace_ms + jitter)).await;
        }

        Ok((records, summary))
    }
}

/// Prefer the author rendered in the library list; fall back to the detail
/// pane's metadata line when the list rendered none. The fallback text is
/// cleaned of the list view's "By:" prefix the same way the list text is.
fn resolve_author(page_html: &str, list_author: &str, detail_selector: &str) -> String {
    if !list_author.is_empty() && list_author != "Unknown Author" {
        return list_author.to_string();
    }
    fragment::page_text_of(page_html, detail_selector)
        .map(|text| extract::clean_author(&text))
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| list_author.to_string())
}
