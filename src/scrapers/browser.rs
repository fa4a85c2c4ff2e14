//! Notebook navigation over a controlled Chromium instance.
//!
//! One browser, one page, strictly sequential: the notebook page is a
//! shared mutable surface, so a book is opened and fully read before the
//! next navigation. Element handles go stale when the library list
//! re-renders; books are always re-resolved by list position.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetUserAgentOverrideParams};
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::{SessionCookie, SessionState};

use super::config::ScraperConfig;
use super::extract;
use super::{BookHandle, BookPage, BookSource, OperatorPrompt, ScrapeError};

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

/// How often a bounded wait re-probes the page for its selector.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Drives the notebook page in a launched Chromium.
pub struct NotebookNavigator {
    config: ScraperConfig,
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
}

impl NotebookNavigator {
    /// Launch a browser and open a blank page ready for navigation.
    pub async fn launch(config: &ScraperConfig, headless: bool) -> Result<Self, ScrapeError> {
        info!("Launching browser (headless={})", headless);

        let chrome_path = find_chrome(config)?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // with_head disables headless
        if !headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--no-sandbox") // Often needed in containers/restricted environments
            .arg("--disable-gpu");

        let browser_config = builder
            .build()
            .map_err(|e| ScrapeError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::Browser(format!("Failed to launch browser: {}", e)))?;

        // Spawn handler task
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Browser(format!("Failed to open page: {}", e)))?;

        if let Some(ref user_agent) = config.user_agent {
            page.execute(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
                .map_err(cdp_err)?;
        }

        Ok(Self {
            config: config.clone(),
            browser,
            handler_task,
            page,
        })
    }

    /// Run the interactive login flow and capture the resulting session.
    ///
    /// Opens a visible browser on the notebook page (which redirects to the
    /// login form when unauthenticated), blocks on the operator's
    /// confirmation, then reads the browser's cookie jar.
    pub async fn bootstrap(
        config: &ScraperConfig,
        prompt: &dyn OperatorPrompt,
    ) -> Result<SessionState, ScrapeError> {
        let navigator = Self::launch(config, false).await?;
        let result = navigator.run_bootstrap(prompt).await;
        navigator.close().await;
        result
    }

    async fn run_bootstrap(&self, prompt: &dyn OperatorPrompt) -> Result<SessionState, ScrapeError> {
        self.goto_notebook().await?;

        info!("Waiting for the operator to complete the login");
        prompt
            .confirm(
                "Log in using the browser window. Once the notebook page is visible, \
                 press Enter here to save the session...",
            )
            .await?;

        let state = self.capture_session().await?;
        if state.cookies.is_empty() {
            warn!("No cookies captured from the browser; the saved session will not be usable");
        }
        Ok(state)
    }

    /// Set the saved session's cookies on the browser. Call before
    /// navigating anywhere.
    pub async fn restore_session(&self, state: &SessionState) {
        debug!("Restoring {} session cookies", state.cookies.len());

        for cookie in &state.cookies {
            if cookie.name.is_empty() || cookie.domain.is_empty() {
                continue;
            }

            let param = CookieParam::builder()
                .name(cookie.name.as_str())
                .value(cookie.value.as_str())
                .domain(cookie.domain.as_str())
                .build();

            match param {
                Ok(param) => {
                    if let Err(e) = self.page.set_cookie(param).await {
                        warn!("Failed to set cookie {}: {}", cookie.name, e);
                    }
                }
                Err(e) => {
                    warn!("Failed to build cookie {}: {}", cookie.name, e);
                }
            }
        }
    }

    /// Navigate to the notebook page and let it settle.
    pub async fn goto_notebook(&self) -> Result<(), ScrapeError> {
        let url = &self.config.notebook_url;
        let bound = self.config.timeouts.page_load();
        info!("Navigating to {}", url);

        let navigation = async {
            self.page.goto(url.as_str()).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(bound, navigation).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(cdp_err(e)),
            Err(_) => {
                return Err(ScrapeError::NavigationTimeout {
                    what: "notebook page".to_string(),
                    seconds: bound.as_secs(),
                })
            }
        }

        // Give client-side rendering a moment to settle
        tokio::time::sleep(self.config.timeouts.settle()).await;
        Ok(())
    }

    /// Scan the library list and describe each book, in rendered order.
    pub async fn enumerate_books(&self) -> Result<Vec<BookHandle>, ScrapeError> {
        let selectors = &self.config.selectors;

        self.wait_for_selector(
            &selectors.book_list,
            self.config.timeouts.book_list_wait(),
            "book list",
        )
        .await?;

        let elements = self
            .page
            .find_elements(selectors.book_list.as_str())
            .await
            .map_err(cdp_err)?;
        info!("Found {} book entries", elements.len());

        let mut books = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let title = element_text(element, &selectors.book_title)
                .await
                .unwrap_or_else(|| "Unknown Title".to_string());

            let author = match element_text(element, &selectors.book_author_list).await {
                Some(raw) => extract::clean_author(&raw),
                None => "Unknown Author".to_string(),
            };

            let asin = match element.attribute(selectors.book_asin_attr.as_str()).await {
                Ok(Some(raw)) if !raw.is_empty() => extract::extract_catalog_id(&raw),
                _ => String::new(),
            };

            books.push(BookHandle {
                index,
                title,
                author,
                asin,
            });
        }

        Ok(books)
    }

    /// Open one book's detail pane and return the rendered page.
    ///
    /// The list element is re-resolved by position because handles from a
    /// previous enumeration go stale once the pane swaps. Returns None when
    /// the re-rendered list no longer reaches `index`; callers should stop
    /// iterating at that point.
    pub async fn open_book(&self, index: usize) -> Result<Option<BookPage>, ScrapeError> {
        let selectors = &self.config.selectors;

        let elements = self
            .page
            .find_elements(selectors.book_list.as_str())
            .await
            .map_err(cdp_err)?;

        let element = match elements.get(index) {
            Some(element) => element,
            None => {
                warn!(
                    "Book index {} out of bounds after re-resolving the list ({} entries)",
                    index,
                    elements.len()
                );
                return Ok(None);
            }
        };

        element.click().await.map_err(cdp_err)?;

        self.wait_for_selector(
            &selectors.any_annotation(),
            self.config.timeouts.annotations_wait(),
            "annotations pane",
        )
        .await?;

        // Extra buffer for annotations that stream in after the first one
        tokio::time::sleep(self.config.timeouts.render_buffer()).await;

        let html = self.page.content().await.map_err(cdp_err)?;
        Ok(Some(BookPage { html }))
    }

    /// Read the browser's cookie jar into a session state.
    async fn capture_session(&self) -> Result<SessionState, ScrapeError> {
        let raw = self.browser.get_cookies().await.map_err(cdp_err)?;
        debug!("Got {} cookies from browser", raw.len());

        let cookies = raw
            .iter()
            .map(|c| SessionCookie {
                name: c.name.clone(),
                value: c.value.clone(),
                domain: c.domain.clone(),
                path: c.path.clone(),
                secure: c.secure,
                http_only: c.http_only,
                expires: serde_json::to_value(&c.expires)
                    .ok()
                    .and_then(|v| v.as_f64()),
            })
            .collect();

        Ok(SessionState::new(cookies))
    }

    /// Poll for a selector until it appears or the bound runs out.
    ///
    /// A single find call returns immediately when the element is missing,
    /// so the bound is enforced by re-probing on an interval.
    async fn wait_for_selector(
        &self,
        selector: &str,
        bound: Duration,
        what: &str,
    ) -> Result<(), ScrapeError> {
        let deadline = tokio::time::Instant::now() + bound;

        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ScrapeError::NavigationTimeout {
                    what: what.to_string(),
                    seconds: bound.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Shut the browser down.
    pub async fn close(mut self) {
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

#[async_trait]
impl BookSource for NotebookNavigator {
    async fn enumerate_books(&self) -> Result<Vec<BookHandle>, ScrapeError> {
        self.enumerate_books().await
    }

    async fn open_book(&self, index: usize) -> Result<Option<BookPage>, ScrapeError> {
        self.open_book(index).await
    }
}

/// Trimmed inner text of the first child matching a selector.
async fn element_text(element: &Element, selector: &str) -> Option<String> {
    let child = element.find_element(selector).await.ok()?;
    let text = child.inner_text().await.ok()??;
    let trimmed = text.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn cdp_err(e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Browser(e.to_string())
}

/// Locate a Chromium executable: explicit configuration first, then common
/// install paths, then PATH.
fn find_chrome(config: &ScraperConfig) -> Result<PathBuf, ScrapeError> {
    if let Some(configured) = config.chrome_executable_or_env() {
        let expanded = shellexpand::tilde(&configured).to_string();
        return Ok(PathBuf::from(expanded));
    }

    for path in CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(cmd) {
            info!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(ScrapeError::Browser(
        "Chrome/Chromium not found. Please install it:\n\
         - Arch/Manjaro: sudo pacman -S chromium\n\
         - Ubuntu/Debian: sudo apt install chromium-browser\n\
         - Fedora: sudo dnf install chromium\n\
         - Or set the CHROME environment variable to an executable"
            .to_string(),
    ))
}
