//! Scraper configuration types.
//!
//! Selectors live in configuration rather than code because the notebook
//! page's markup is not under this system's control and drifts. The
//! navigator and extractor are correct relative to whatever selector set
//! is configured here; defaults mirror the page as currently rendered.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scraper configuration from the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Page holding the annotation library.
    #[serde(default = "default_notebook_url")]
    pub notebook_url: String,
    /// User agent override. None uses the browser's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Explicit Chromium executable path. None triggers discovery.
    /// Also settable via the CHROME environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_executable: Option<String>,
    #[serde(default, skip_serializing_if = "SelectorConfig::is_default")]
    pub selectors: SelectorConfig,
    #[serde(default, skip_serializing_if = "TimeoutConfig::is_default")]
    pub timeouts: TimeoutConfig,
    /// Extracted-record count at which the source is suspected of capping
    /// the export. Empirical, account-dependent, and only a heuristic; a
    /// book is flagged when it hits this count AND shows the limit notice.
    #[serde(default = "default_export_limit_threshold")]
    pub export_limit_threshold: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            notebook_url: default_notebook_url(),
            user_agent: None,
            chrome_executable: None,
            selectors: SelectorConfig::default(),
            timeouts: TimeoutConfig::default(),
            export_limit_threshold: default_export_limit_threshold(),
        }
    }
}

impl ScraperConfig {
    /// Check if the config equals the default (for skip_serializing_if).
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Chromium executable, config value or CHROME env var.
    pub fn chrome_executable_or_env(&self) -> Option<String> {
        self.chrome_executable
            .clone()
            .or_else(|| std::env::var("CHROME").ok().filter(|s| !s.is_empty()))
    }
}

fn default_notebook_url() -> String {
    "https://read.amazon.com/notebook".to_string()
}

fn default_export_limit_threshold() -> usize {
    100
}

/// CSS selectors keyed by logical role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// One entry per book in the library list.
    #[serde(default = "default_book_list")]
    pub book_list: String,
    /// Title element within a book list entry.
    #[serde(default = "default_book_title")]
    pub book_title: String,
    /// Author element within a book list entry.
    #[serde(default = "default_book_author_list")]
    pub book_author_list: String,
    /// Author element in the opened book's detail pane.
    #[serde(default = "default_book_author_detail")]
    pub book_author_detail: String,
    /// Attribute on the book list entry carrying the catalog id.
    #[serde(default = "default_book_asin_attr")]
    pub book_asin_attr: String,
    /// One entry per highlight in the detail pane.
    #[serde(default = "default_highlight")]
    pub highlight: String,
    /// One entry per note in the detail pane.
    #[serde(default = "default_note")]
    pub note: String,
    /// Attribute on an annotation fragment carrying its stable id.
    #[serde(default = "default_annotation_id_attr")]
    pub annotation_id_attr: String,
    /// Text body within a highlight fragment.
    #[serde(default = "default_highlight_text")]
    pub highlight_text: String,
    /// Text body within a note fragment.
    #[serde(default = "default_note_text")]
    pub note_text: String,
    /// Position header within a fragment.
    #[serde(default = "default_location")]
    pub location: String,
    /// Alert container that may carry the export-limit notice.
    #[serde(default = "default_limit_notice")]
    pub limit_notice: String,
    /// Substring identifying the export-limit notice text.
    #[serde(default = "default_limit_notice_text")]
    pub limit_notice_text: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            book_list: default_book_list(),
            book_title: default_book_title(),
            book_author_list: default_book_author_list(),
            book_author_detail: default_book_author_detail(),
            book_asin_attr: default_book_asin_attr(),
            highlight: default_highlight(),
            note: default_note(),
            annotation_id_attr: default_annotation_id_attr(),
            highlight_text: default_highlight_text(),
            note_text: default_note_text(),
            location: default_location(),
            limit_notice: default_limit_notice(),
            limit_notice_text: default_limit_notice_text(),
        }
    }
}

impl SelectorConfig {
    /// Check if the config equals the default (for skip_serializing_if).
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Combined selector matching any annotation fragment.
    pub fn any_annotation(&self) -> String {
        format!("{}, {}", self.highlight, self.note)
    }
}

fn default_book_list() -> String {
    "div.kp-notebook-library-each-book".to_string()
}
fn default_book_title() -> String {
    "h2.kp-notebook-searchable".to_string()
}
fn default_book_author_list() -> String {
    "p.a-spacing-base.a-spacing-top-mini.a-text-center.a-size-base.a-color-secondary.kp-notebook-searchable"
        .to_string()
}
fn default_book_author_detail() -> String {
    "p.a-spacing-none.a-spacing-top-micro.a-size-base.a-color-secondary.kp-notebook-selectable.kp-notebook-metadata"
        .to_string()
}
fn default_book_asin_attr() -> String {
    "id".to_string()
}
fn default_highlight() -> String {
    "div[id^='highlight-']".to_string()
}
fn default_note() -> String {
    "div[id^='note-']".to_string()
}
fn default_annotation_id_attr() -> String {
    "id".to_string()
}
fn default_highlight_text() -> String {
    "#highlight".to_string()
}
fn default_note_text() -> String {
    "#note".to_string()
}
fn default_location() -> String {
    "#annotationHighlightHeader".to_string()
}
fn default_limit_notice() -> String {
    "div.a-alert-content".to_string()
}
fn default_limit_notice_text() -> String {
    "hidden or truncated due to export limits".to_string()
}

/// Wait bounds for page rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Full page load bound in seconds.
    #[serde(default = "default_page_load_secs")]
    pub page_load_secs: u64,
    /// Bound for the book list to appear, in seconds.
    #[serde(default = "default_book_list_secs")]
    pub book_list_secs: u64,
    /// Bound for a book's annotations to appear, in seconds.
    #[serde(default = "default_annotations_secs")]
    pub annotations_secs: u64,
    /// Settle delay after navigation, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Extra buffer after annotations render, in milliseconds.
    #[serde(default = "default_render_buffer_ms")]
    pub render_buffer_ms: u64,
    /// Pacing delay between book openings, in milliseconds; jitter adds
    /// up to the same amount again.
    #[serde(default = "default_book_pace_ms")]
    pub book_pace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            page_load_secs: default_page_load_secs(),
            book_list_secs: default_book_list_secs(),
            annotations_secs: default_annotations_secs(),
            settle_ms: default_settle_ms(),
            render_buffer_ms: default_render_buffer_ms(),
            book_pace_ms: default_book_pace_ms(),
        }
    }
}

impl TimeoutConfig {
    /// Check if the config equals the default (for skip_serializing_if).
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn page_load(&self) -> Duration {
        Duration::from_secs(self.page_load_secs)
    }

    pub fn book_list_wait(&self) -> Duration {
        Duration::from_secs(self.book_list_secs)
    }

    pub fn annotations_wait(&self) -> Duration {
        Duration::from_secs(self.annotations_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn render_buffer(&self) -> Duration {
        Duration::from_millis(self.render_buffer_ms)
    }
}

fn default_page_load_secs() -> u64 {
    90
}
fn default_book_list_secs() -> u64 {
    30
}
fn default_annotations_secs() -> u64 {
    20
}
fn default_settle_ms() -> u64 {
    5000
}
fn default_render_buffer_ms() -> u64 {
    2000
}
fn default_book_pace_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_defaults() {
        let config: SelectorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.book_list, "div.kp-notebook-library-each-book");
        assert_eq!(config.highlight, "div[id^='highlight-']");
        assert_eq!(config.note, "div[id^='note-']");
        assert_eq!(config.book_asin_attr, "id");
        assert_eq!(
            config.any_annotation(),
            "div[id^='highlight-'], div[id^='note-']"
        );
    }

    #[test]
    fn test_timeout_defaults() {
        let config: TimeoutConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.page_load(), Duration::from_secs(90));
        assert_eq!(config.book_list_wait(), Duration::from_secs(30));
        assert_eq!(config.annotations_wait(), Duration::from_secs(20));
        assert_eq!(config.settle(), Duration::from_millis(5000));
        assert_eq!(config.book_pace_ms, 1000);
    }

    #[test]
    fn test_scraper_config_defaults() {
        let config: ScraperConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.notebook_url, "https://read.amazon.com/notebook");
        assert_eq!(config.export_limit_threshold, 100);
        assert!(config.user_agent.is_none());
        assert!(config.is_default());
    }

    #[test]
    fn test_scraper_config_toml_overrides() {
        let toml = r#"
            notebook_url = "https://read.amazon.co.uk/notebook"
            export_limit_threshold = 200

            [selectors]
            book_list = "div.library-book"

            [timeouts]
            page_load_secs = 30
        "#;

        let config: ScraperConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.notebook_url, "https://read.amazon.co.uk/notebook");
        assert_eq!(config.export_limit_threshold, 200);
        assert_eq!(config.selectors.book_list, "div.library-book");
        // Unset fields keep their defaults
        assert_eq!(config.selectors.highlight, "div[id^='highlight-']");
        assert_eq!(config.timeouts.page_load_secs, 30);
        assert_eq!(config.timeouts.book_list_secs, 30);
        assert!(!config.is_default());
    }
}
