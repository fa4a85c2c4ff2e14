//! Scraping layer for the reading-notebook page.
//!
//! `fragment` and `extract` are pure HTML-in, records-out and run without a
//! browser; `browser` drives the live page and is feature-gated so the rest
//! of the crate builds without Chromium present.

use std::io::Write;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "browser")]
pub mod browser;
pub mod config;
pub mod extract;
pub mod fragment;

#[cfg(feature = "browser")]
pub use browser::NotebookNavigator;
pub use config::{ScraperConfig, SelectorConfig, TimeoutConfig};
pub use extract::{AnnotationExtractor, PageExtraction};
pub use fragment::Fragment;

/// Errors from driving the notebook page.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The operator never confirmed the interactive login.
    #[error("Operator input ended before login was confirmed")]
    AuthTimeout,

    /// A bounded wait on page content ran out.
    #[error("Timed out after {seconds}s waiting for {what}")]
    NavigationTimeout { what: String, seconds: u64 },

    /// Browser launch or protocol failure.
    #[error("Browser error: {0}")]
    Browser(String),
}

/// One entry in the library list, captured during enumeration.
///
/// The index is positional: the list re-renders after each detail load, so
/// handles are re-resolved by position rather than held across navigations.
#[derive(Debug, Clone)]
pub struct BookHandle {
    pub index: usize,
    pub title: String,
    pub author: String,
    pub asin: String,
}

/// A book's rendered detail pane, as raw page HTML.
#[derive(Debug)]
pub struct BookPage {
    pub html: String,
}

/// Supplies library books to the harvest loop.
///
/// The live implementation is the browser navigator; the loop only ever
/// sees this surface, so anything that lists books can drive it.
#[async_trait]
pub trait BookSource: Send + Sync {
    /// Enumerate the library list in page order.
    async fn enumerate_books(&self) -> Result<Vec<BookHandle>, ScrapeError>;

    /// Open one book's detail pane by list position. Ok(None) when the
    /// list no longer reaches the index.
    async fn open_book(&self, index: usize) -> Result<Option<BookPage>, ScrapeError>;
}

/// Blocking confirmation from the operator during interactive login.
///
/// The wait is human-paced and deliberately unbounded; implementations
/// resolve when the operator confirms and fail only when input can no
/// longer arrive.
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    async fn confirm(&self, message: &str) -> Result<(), ScrapeError>;
}

/// Reads the confirmation from the terminal.
pub struct StdinPrompt;

#[async_trait]
impl OperatorPrompt for StdinPrompt {
    async fn confirm(&self, message: &str) -> Result<(), ScrapeError> {
        print!("{} ", message);
        let _ = std::io::stdout().flush();

        // Blocks until the operator presses Enter; EOF means input can
        // never arrive.
        let read = tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            std::io::stdin().read_line(&mut input)
        })
        .await;

        match read {
            Ok(Ok(0)) => Err(ScrapeError::AuthTimeout),
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) | Err(_) => Err(ScrapeError::AuthTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysConfirm;

    #[async_trait]
    impl OperatorPrompt for AlwaysConfirm {
        async fn confirm(&self, _message: &str) -> Result<(), ScrapeError> {
            Ok(())
        }
    }

    struct NeverConfirm;

    #[async_trait]
    impl OperatorPrompt for NeverConfirm {
        async fn confirm(&self, _message: &str) -> Result<(), ScrapeError> {
            Err(ScrapeError::AuthTimeout)
        }
    }

    #[tokio::test]
    async fn test_prompt_doubles_drive_both_outcomes() {
        let ok: &dyn OperatorPrompt = &AlwaysConfirm;
        assert!(ok.confirm("continue?").await.is_ok());

        let gone: &dyn OperatorPrompt = &NeverConfirm;
        let err = gone.confirm("continue?").await.unwrap_err();
        assert!(matches!(err, ScrapeError::AuthTimeout));
    }

    #[test]
    fn test_error_messages_name_the_wait() {
        let err = ScrapeError::NavigationTimeout {
            what: "book list".to_string(),
            seconds: 30,
        };
        assert_eq!(err.to_string(), "Timed out after 30s waiting for book list");
    }
}
