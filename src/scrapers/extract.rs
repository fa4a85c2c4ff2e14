//! Structured record extraction from annotation fragments.
//!
//! Classification and field pulls are driven entirely by the configured
//! selector set. A fragment that matches neither annotation kind, or that
//! carries no stable id, is skipped and tallied rather than failing the
//! book.

use regex::Regex;
use tracing::{debug, warn};

use crate::models::{AnnotationRecord, ItemType};

use super::config::{ScraperConfig, SelectorConfig};
use super::fragment::{self, Fragment};

/// Everything pulled from one book's rendered detail pane.
#[derive(Debug, Default)]
pub struct PageExtraction {
    /// Records in page order.
    pub records: Vec<AnnotationRecord>,
    /// Fragments dropped for missing a stable id or matching no known kind.
    pub skipped: usize,
    /// Export-limit heuristic outcome for this book.
    pub limited: bool,
}

/// Turns raw annotation fragments into [`AnnotationRecord`]s.
pub struct AnnotationExtractor {
    selectors: SelectorConfig,
    limit_threshold: usize,
}

impl AnnotationExtractor {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            selectors: config.selectors.clone(),
            limit_threshold: config.export_limit_threshold,
        }
    }

    /// Extract a single fragment. None means the fragment is skipped:
    /// it matches neither annotation selector, or has no stable id to
    /// deduplicate on.
    pub fn extract_fragment(
        &self,
        fragment: &Fragment,
        book_title: &str,
        book_author: &str,
        book_asin: &str,
    ) -> Option<AnnotationRecord> {
        let item_type = if fragment.matches(&self.selectors.highlight) {
            ItemType::Highlight
        } else if fragment.matches(&self.selectors.note) {
            ItemType::Note
        } else {
            return None;
        };

        let original_id = match fragment.attr(&self.selectors.annotation_id_attr) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return None,
        };

        let text_selector = match item_type {
            ItemType::Highlight => &self.selectors.highlight_text,
            ItemType::Note => &self.selectors.note_text,
        };
        let content = fragment
            .text_of(text_selector)
            .map(|text| normalize_quotes(&text))
            .unwrap_or_default();
        let location = fragment.text_of(&self.selectors.location).unwrap_or_default();

        Some(AnnotationRecord::new(
            book_title.to_string(),
            book_author.to_string(),
            book_asin.to_string(),
            item_type,
            content,
            original_id,
            location,
        ))
    }

    /// Extract every annotation from a book's rendered detail page.
    ///
    /// The limited flag is a heuristic: the record count sitting exactly at
    /// the configured cap AND the page showing the limit notice. Either
    /// signal alone is not enough; a book can legitimately have exactly the
    /// cap's worth of highlights, and the notice container is also used for
    /// unrelated alerts.
    pub fn extract_page(
        &self,
        page_html: &str,
        book_title: &str,
        book_author: &str,
        book_asin: &str,
    ) -> PageExtraction {
        let any_selector = self.selectors.any_annotation();
        let fragment_htmls = fragment::split_page_fragments(page_html, &any_selector);

        let mut records = Vec::new();
        let mut skipped = 0usize;

        for html in &fragment_htmls {
            let parsed = match Fragment::parse(html) {
                Some(f) => f,
                None => {
                    skipped += 1;
                    continue;
                }
            };
            match self.extract_fragment(&parsed, book_title, book_author, book_asin) {
                Some(record) => records.push(record),
                None => {
                    skipped += 1;
                    debug!("Skipping fragment without a stable id in '{}'", book_title);
                }
            }
        }

        let limited = records.len() == self.limit_threshold
            && fragment::page_selector_text_contains(
                page_html,
                &self.selectors.limit_notice,
                &self.selectors.limit_notice_text,
            );
        if limited {
            warn!(
                "Export limit notice found for '{}' at {} records",
                book_title,
                records.len()
            );
        }

        PageExtraction {
            records,
            skipped,
            limited,
        }
    }
}

/// Normalize curly quotes to straight ones.
///
/// Double curly quotes become straight single quotes. A left single curly
/// quote always becomes a straight double quote. A right single curly
/// quote is an apostrophe when flanked by letters or trailing a word-final
/// `s`, and a closing quotation mark otherwise.
pub fn normalize_quotes(text: &str) -> String {
    let text = text.replace('\u{201c}', "'").replace('\u{201d}', "'");

    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());

    for (i, &ch) in chars.iter().enumerate() {
        match ch {
            '\u{2018}' => result.push('"'),
            '\u{2019}' => {
                let prev = if i > 0 { chars[i - 1] } else { ' ' };
                let next = chars.get(i + 1).copied().unwrap_or(' ');
                let is_apostrophe = (prev.is_alphabetic() && next.is_alphabetic())
                    || (prev.to_ascii_lowercase() == 's' && !next.is_alphanumeric());
                result.push(if is_apostrophe { '\'' } else { '"' });
            }
            _ => result.push(ch),
        }
    }

    result
}

/// Catalog id from a raw book-element attribute.
///
/// The attribute embeds a ten-character uppercase alphanumeric id for store
/// books; anything else (sideloaded documents) falls back to a prefixed
/// copy of the raw value.
pub fn extract_catalog_id(raw: &str) -> String {
    match Regex::new(r"[A-Z0-9]{10}") {
        Ok(re) => match re.find(raw) {
            Some(m) => m.as_str().to_string(),
            None => format!("custom_id_{}", raw),
        },
        Err(_) => format!("custom_id_{}", raw),
    }
}

/// Strip the list view's "By:" prefix from an author string.
pub fn clean_author(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("By:") {
        trimmed.replace("By:", "").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> AnnotationExtractor {
        AnnotationExtractor::new(&ScraperConfig::default())
    }

    #[test]
    fn test_normalize_double_curly_quotes() {
        assert_eq!(
            normalize_quotes("\u{201c}Hello world\u{201d}"),
            "'Hello world'"
        );
    }

    #[test]
    fn test_normalize_left_single_curly_quote() {
        assert_eq!(normalize_quotes("\u{2018}go now"), "\"go now");
    }

    #[test]
    fn test_right_single_curly_quote_as_apostrophe() {
        // Inside a word
        assert_eq!(normalize_quotes("don\u{2019}t stop"), "don't stop");
        // After a word-final s (plural possessive)
        assert_eq!(normalize_quotes("the girls\u{2019} books"), "the girls' books");
    }

    #[test]
    fn test_right_single_curly_quote_as_closing_quote() {
        // Preceded by a letter, followed by space: closing quote
        assert_eq!(
            normalize_quotes("\u{2018}go now\u{2019} she said"),
            "\"go now\" she said"
        );
        // Isolated
        assert_eq!(normalize_quotes("a \u{2019} b"), "a \" b");
        // At end of input
        assert_eq!(normalize_quotes("the end\u{2019}"), "the end\"");
    }

    #[test]
    fn test_extract_catalog_id() {
        assert_eq!(extract_catalog_id("B002PDMYQO"), "B002PDMYQO");
        assert_eq!(extract_catalog_id("prefix-B002PDMYQO-suffix"), "B002PDMYQO");
        assert_eq!(extract_catalog_id("abc123"), "custom_id_abc123");
        assert_eq!(
            extract_catalog_id("9f2c1e0a7d"),
            "custom_id_9f2c1e0a7d"
        );
    }

    #[test]
    fn test_clean_author() {
        assert_eq!(clean_author("By: Ursula K. Le Guin"), "Ursula K. Le Guin");
        assert_eq!(clean_author("Ursula K. Le Guin"), "Ursula K. Le Guin");
        assert_eq!(clean_author("  By:Octavia Butler  "), "Octavia Butler");
    }

    #[test]
    fn test_extract_highlight_fragment() {
        let html = r#"
            <div id="highlight-QV9GJ2M">
                <span id="annotationHighlightHeader">Yellow highlight | Page: 42</span>
                <span id="highlight">She said \u{2018}wait\u{2019} twice.</span>
            </div>
        "#
        .replace("\\u{2018}", "\u{2018}")
        .replace("\\u{2019}", "\u{2019}");

        let fragment = Fragment::parse(&html).unwrap();
        let record = extractor()
            .extract_fragment(&fragment, "The Dispossessed", "Ursula K. Le Guin", "B002PDMYQO")
            .unwrap();

        assert_eq!(record.item_type, ItemType::Highlight);
        assert_eq!(record.original_id, "highlight-QV9GJ2M");
        assert_eq!(record.content, "She said \"wait\" twice.");
        assert_eq!(record.location, "Yellow highlight | Page: 42");
        assert_eq!(record.book_title, "The Dispossessed");
        assert!(record.is_valid_for_write());
    }

    #[test]
    fn test_extract_note_fragment() {
        let html = r#"
            <div id="note-XYZ99">
                <span id="annotationNoteHeader">Note | Page: 7</span>
                <span id="note">Compare with chapter two.</span>
            </div>
        "#;

        let fragment = Fragment::parse(html).unwrap();
        let record = extractor()
            .extract_fragment(&fragment, "Piranesi", "Susanna Clarke", "B085175FW7")
            .unwrap();

        assert_eq!(record.item_type, ItemType::Note);
        assert_eq!(record.original_id, "note-XYZ99");
        assert_eq!(record.content, "Compare with chapter two.");
    }

    #[test]
    fn test_fragment_without_stable_id_is_skipped() {
        // Class-based selectors can match an element with no id at all;
        // such a fragment cannot be deduplicated and must be skipped.
        let mut config = ScraperConfig::default();
        config.selectors.highlight = "div.kp-highlight".to_string();

        let html = r#"<div class="kp-highlight"><span id="highlight">text</span></div>"#;
        let fragment = Fragment::parse(html).unwrap();

        let result = AnnotationExtractor::new(&config).extract_fragment(
            &fragment,
            "Title",
            "Author",
            "ASIN123456",
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_unclassifiable_fragment_is_skipped() {
        let html = r#"<div id="bookmark-1"><span id="highlight">text</span></div>"#;
        let fragment = Fragment::parse(html).unwrap();
        let result = extractor().extract_fragment(&fragment, "Title", "Author", "");
        assert!(result.is_none());
    }

    #[test]
    fn test_empty_content_still_produces_record() {
        // Position-only highlights have a header but no text body.
        let html = r#"
            <div id="highlight-EMPTY1">
                <span id="annotationHighlightHeader">Yellow highlight | Page: 3</span>
                <span id="highlight"></span>
            </div>
        "#;

        let fragment = Fragment::parse(html).unwrap();
        let record = extractor()
            .extract_fragment(&fragment, "Title", "Author", "B000000000")
            .unwrap();
        assert_eq!(record.content, "");
        assert!(record.is_valid_for_write());
    }

    fn page_with_fragments(count: usize, with_notice: bool) -> String {
        let mut body = String::new();
        if with_notice {
            body.push_str(
                "<div class=\"a-alert-content\">Some items have been hidden or \
                 truncated due to export limits.</div>",
            );
        }
        for i in 0..count {
            body.push_str(&format!(
                "<div id=\"highlight-{i}\"><span id=\"highlight\">Text {i}</span></div>"
            ));
        }
        format!("<html><body>{}</body></html>", body)
    }

    #[test]
    fn test_extract_page_orders_and_tallies() {
        let page = r#"
            <html><body>
                <div id="highlight-A"><span id="highlight">First.</span></div>
                <div id="note-B"><span id="note">Second.</span></div>
                <div id="highlight-C"><span id="highlight">Third.</span></div>
            </body></html>
        "#;

        let extraction = extractor().extract_page(page, "Title", "Author", "B000000000");
        assert_eq!(extraction.records.len(), 3);
        assert_eq!(extraction.skipped, 0);
        assert!(!extraction.limited);

        let ids: Vec<&str> = extraction
            .records
            .iter()
            .map(|r| r.original_id.as_str())
            .collect();
        assert_eq!(ids, vec!["highlight-A", "note-B", "highlight-C"]);
        assert_eq!(extraction.records[1].item_type, ItemType::Note);
    }

    #[test]
    fn test_export_limit_requires_count_and_notice() {
        let mut config = ScraperConfig::default();
        config.export_limit_threshold = 3;
        let extractor = AnnotationExtractor::new(&config);

        // Count at threshold, notice present: limited
        let extraction =
            extractor.extract_page(&page_with_fragments(3, true), "Title", "Author", "");
        assert!(extraction.limited);
        assert_eq!(extraction.records.len(), 3);

        // Count at threshold but no notice: a legitimately small book
        let extraction =
            extractor.extract_page(&page_with_fragments(3, false), "Title", "Author", "");
        assert!(!extraction.limited);

        // Notice present but count below threshold: unrelated alert
        let extraction =
            extractor.extract_page(&page_with_fragments(2, true), "Title", "Author", "");
        assert!(!extraction.limited);
    }
}
