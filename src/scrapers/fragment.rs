//! HTML fragment parsing for annotation extraction.
//!
//! The navigator hands over raw page HTML; everything here is synchronous
//! string work on top of the `scraper` crate. `Html` documents are never
//! held across an await point.

use scraper::{Html, Selector};

/// A single annotation block lifted out of the page DOM.
///
/// Wraps a parsed fragment rooted at the block's own element, so selector
/// probes run against the block rather than the whole page. Tests can build
/// one straight from an HTML string.
#[derive(Debug)]
pub struct Fragment {
    doc: Html,
}

impl Fragment {
    /// Parse an HTML string into a fragment. Returns None when the string
    /// contains no element at all.
    pub fn parse(html: &str) -> Option<Self> {
        let doc = Html::parse_fragment(html);
        doc.root_element().child_elements().next()?;
        Some(Self { doc })
    }

    fn root(&self) -> scraper::ElementRef<'_> {
        // parse() guarantees at least one child element
        self.doc
            .root_element()
            .child_elements()
            .next()
            .expect("fragment root element")
    }

    /// Whether the fragment's root element matches a selector.
    pub fn matches(&self, selector: &str) -> bool {
        match Selector::parse(selector) {
            Ok(sel) => sel.matches(&self.root()),
            Err(_) => false,
        }
    }

    /// Attribute value on the fragment's root element.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.root().value().attr(name)
    }

    /// Trimmed text of the first descendant matching a selector.
    /// None when nothing matches; Some("") when the element is empty.
    pub fn text_of(&self, selector: &str) -> Option<String> {
        let sel = Selector::parse(selector).ok()?;
        self.doc
            .select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
    }

    /// Attribute value of the first descendant matching a selector.
    pub fn attr_of(&self, selector: &str, attr: &str) -> Option<String> {
        let sel = Selector::parse(selector).ok()?;
        self.doc
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr(attr).map(|v| v.to_string()))
    }
}

/// Split a page into per-annotation fragments, in document order.
///
/// `selector` is a comma list covering every annotation kind, so one pass
/// over the DOM preserves the on-page ordering across kinds.
pub fn split_page_fragments(page_html: &str, selector: &str) -> Vec<String> {
    let selector = match Selector::parse(selector) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let document = Html::parse_document(page_html);
    document
        .select(&selector)
        .map(|element| element.html())
        .collect()
}

/// Whether any element matching `selector` has text containing `needle`.
///
/// Both sides are compared with whitespace runs collapsed to single
/// spaces, so a phrase wrapped across source lines still matches.
pub fn page_selector_text_contains(page_html: &str, selector: &str, needle: &str) -> bool {
    let selector = match Selector::parse(selector) {
        Ok(s) => s,
        Err(_) => return false,
    };

    let needle = collapse_whitespace(needle);
    let document = Html::parse_document(page_html);
    document.select(&selector).any(|element| {
        collapse_whitespace(&element.text().collect::<String>()).contains(&needle)
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trimmed text of the first element matching `selector` in a full page.
pub fn page_text_of(page_html: &str, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let document = Html::parse_document(page_html);
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIGHLIGHT_HTML: &str = r#"
        <div id="highlight-QV9GJ2M" class="a-row">
            <span id="annotationHighlightHeader">Yellow highlight | Page: 42</span>
            <span id="highlight">The map is not the territory.</span>
        </div>
    "#;

    const NOTE_HTML: &str = r#"
        <div id="note-ABC123" class="a-row">
            <span id="annotationNoteHeader">Note | Location: 310</span>
            <span id="note">Compare with chapter two.</span>
        </div>
    "#;

    #[test]
    fn test_fragment_matches_root() {
        let fragment = Fragment::parse(HIGHLIGHT_HTML).unwrap();
        assert!(fragment.matches("div[id^='highlight-']"));
        assert!(!fragment.matches("div[id^='note-']"));

        let fragment = Fragment::parse(NOTE_HTML).unwrap();
        assert!(fragment.matches("div[id^='note-']"));
        assert!(!fragment.matches("div[id^='highlight-']"));
    }

    #[test]
    fn test_fragment_attr_and_text() {
        let fragment = Fragment::parse(HIGHLIGHT_HTML).unwrap();
        assert_eq!(fragment.attr("id"), Some("highlight-QV9GJ2M"));
        assert_eq!(
            fragment.text_of("#highlight").as_deref(),
            Some("The map is not the territory.")
        );
        assert_eq!(
            fragment.text_of("#annotationHighlightHeader").as_deref(),
            Some("Yellow highlight | Page: 42")
        );
        assert_eq!(fragment.text_of("#note"), None);
    }

    #[test]
    fn test_fragment_attr_of_descendant() {
        // The page stores a highlight's numeric position in a hidden input
        let html = r#"
            <div id="highlight-QV9GJ2M" class="a-row">
                <input type="hidden" id="kp-annotation-location" value="2841">
                <span id="highlight">The map is not the territory.</span>
            </div>
        "#;

        let fragment = Fragment::parse(html).unwrap();
        assert_eq!(
            fragment
                .attr_of("input#kp-annotation-location", "value")
                .as_deref(),
            Some("2841")
        );
        assert_eq!(fragment.attr_of("input#kp-annotation-location", "name"), None);
        assert_eq!(fragment.attr_of("select", "value"), None);
    }

    #[test]
    fn test_fragment_rejects_empty_input() {
        assert!(Fragment::parse("").is_none());
        assert!(Fragment::parse("   just text   ").is_none());
    }

    #[test]
    fn test_split_preserves_document_order() {
        let page = format!(
            "<html><body><div id='library'>{}{}{}</div></body></html>",
            HIGHLIGHT_HTML,
            NOTE_HTML,
            "<div id=\"highlight-ZZZ\"><span id=\"highlight\">Second.</span></div>"
        );

        let fragments = split_page_fragments(&page, "div[id^='highlight-'], div[id^='note-']");
        assert_eq!(fragments.len(), 3);
        assert!(fragments[0].contains("highlight-QV9GJ2M"));
        assert!(fragments[1].contains("note-ABC123"));
        assert!(fragments[2].contains("highlight-ZZZ"));
    }

    #[test]
    fn test_page_selector_text_contains() {
        let page = r#"
            <html><body>
                <div class="a-alert-content">Some highlights have been hidden or
                truncated due to export limits.</div>
            </body></html>
        "#;

        assert!(page_selector_text_contains(
            page,
            "div.a-alert-content",
            "hidden or truncated due to export limits"
        ));
        // A needle carrying its own line break matches too
        assert!(page_selector_text_contains(
            page,
            "div.a-alert-content",
            "hidden or\ntruncated due to export limits"
        ));
        assert!(!page_selector_text_contains(
            page,
            "div.a-alert-content",
            "no such phrase"
        ));
        assert!(!page_selector_text_contains(
            page,
            "div.missing",
            "hidden or truncated"
        ));
    }
}
