//! Annotation models for Kindle highlight and note storage.
//!
//! Each record corresponds to one highlight or note element scraped from
//! the notebook page, keyed by the element's own id for deduplication
//! across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of annotation a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Highlight,
    Note,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highlight => "highlight",
            Self::Note => "note",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "highlight" => Some(Self::Highlight),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

/// A single highlight or note pulled from a book's notebook pane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Database row ID.
    pub id: i64,
    /// Owning book's display title.
    pub book_title: String,
    /// Owning book's author as rendered in the library list.
    pub book_author: String,
    /// Owning book's catalog identifier, if resolvable.
    pub book_asin: String,
    /// Whether this is a highlight or a note.
    pub item_type: ItemType,
    /// The annotation's text body. May be empty for position-only highlights.
    pub content: String,
    /// The source element's own id. Unique across the store; the dedup key.
    pub original_id: String,
    /// Human-readable position marker as rendered by the source.
    pub location: String,
    /// Creation time as reported by the source, when it renders one.
    pub date_created: Option<DateTime<Utc>>,
    /// When this system retrieved the record. Never sourced from the page.
    pub retrieved_at: DateTime<Utc>,
}

impl AnnotationRecord {
    /// Create a new record stamped with the current retrieval time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        book_title: String,
        book_author: String,
        book_asin: String,
        item_type: ItemType,
        content: String,
        original_id: String,
        location: String,
    ) -> Self {
        Self {
            id: 0, // Set by database
            book_title,
            book_author,
            book_asin,
            item_type,
            content,
            original_id,
            location,
            date_created: None,
            retrieved_at: Utc::now(),
        }
    }

    /// A record needs a non-empty title and dedup key to be written.
    pub fn is_valid_for_write(&self) -> bool {
        !self.book_title.is_empty() && !self.original_id.is_empty()
    }
}

/// Per-run, per-book extraction outcome. Not persisted.
#[derive(Debug, Clone)]
pub struct BookExportStatus {
    /// Book title as rendered in the library list.
    pub title: String,
    /// True when the extracted count hit the capped threshold with a
    /// limit notice on the page.
    pub limited: bool,
    /// True when the book's detail pane never rendered within bounds.
    pub failed_to_load: bool,
    /// Records successfully extracted from this book.
    pub extracted: usize,
    /// Fragments skipped for missing a stable id.
    pub skipped: usize,
}

impl BookExportStatus {
    pub fn new(title: String) -> Self {
        Self {
            title,
            limited: false,
            failed_to_load: false,
            extracted: 0,
            skipped: 0,
        }
    }
}

/// End-of-run totals surfaced to the operator.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Books visited this run, successful or not.
    pub books_processed: usize,
    /// Records extracted across all books.
    pub records_collected: usize,
    /// Rows newly inserted by the deduplicating write.
    pub records_written: usize,
    /// Fragments skipped for missing a stable id.
    pub fragments_skipped: usize,
    /// Titles flagged by the export-limit heuristic.
    pub limited_books: Vec<String>,
    /// Titles whose detail pane never loaded.
    pub failed_books: Vec<String>,
}

impl RunSummary {
    /// Fold one book's outcome into the totals.
    pub fn record_book(&mut self, status: &BookExportStatus) {
        self.books_processed += 1;
        self.records_collected += status.extracted;
        self.fragments_skipped += status.skipped;
        if status.limited {
            self.limited_books.push(status.title.clone());
        }
        if status.failed_to_load {
            self.failed_books.push(status.title.clone());
        }
    }
}
