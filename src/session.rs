//! Session state persistence for the authenticated browser context.
//!
//! The session blob is the cookie set captured after an interactive login,
//! stored as pretty-printed JSON. Loading never fails: a missing or
//! unreadable file means "no session", which callers treat as "must
//! bootstrap". The blob is plaintext on disk; protecting it is left to the
//! operator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from persisting session state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to serialize session state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write session state: {0}")]
    Io(#[from] std::io::Error),
}

/// Cookie captured from the browser session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// Expiry as unix seconds. Absent or negative for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

/// The authentication state captured from an interactive login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<SessionCookie>,
}

impl SessionState {
    pub fn new(cookies: Vec<SessionCookie>) -> Self {
        Self { cookies }
    }

    /// Whether this state is worth trying headless navigation with.
    ///
    /// An empty cookie set cannot be authenticated, and any cookie with a
    /// positive expiry in the past means the login has lapsed. Negative
    /// expiry values are session cookies and carry no deadline.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        if self.cookies.is_empty() {
            return false;
        }
        let now_secs = now.timestamp() as f64;
        for cookie in &self.cookies {
            if let Some(expires) = cookie.expires {
                if expires > 0.0 && expires < now_secs {
                    debug!("Session cookie '{}' has expired", cookie.name);
                    return false;
                }
            }
        }
        true
    }
}

/// Loads and saves the session blob at a fixed path.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the stored session, if any.
    ///
    /// Missing and corrupt files both yield `None`; corruption is logged
    /// but never surfaced as an error.
    pub fn load(&self) -> Option<SessionState> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => {
                debug!("No session state at {:?}", self.path);
                return None;
            }
        };

        match serde_json::from_str::<SessionState>(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Ignoring unreadable session state {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Persist the session blob, creating the parent directory if needed.
    pub fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        let json = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;

        info!("Saved {} cookies to {:?}", state.cookies.len(), self.path);

        Ok(())
    }

    /// Best-effort removal of an invalidated session file.
    pub fn remove(&self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to remove session state {:?}: {}", self.path, e);
            } else {
                info!("Removed stale session state {:?}", self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, expires: Option<f64>) -> SessionCookie {
        SessionCookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: ".amazon.com".to_string(),
            path: "/".to_string(),
            secure: true,
            http_only: true,
            expires,
        }
    }

    #[test]
    fn test_load_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("auth_state.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth_state.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = SessionStore::new(path);
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("auth_state.json"));

        let state = SessionState::new(vec![cookie("session-id", Some(4102444800.0))]);
        store.save(&state).unwrap();

        let loaded = store.load().expect("state should load back");
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.cookies[0].name, "session-id");
    }

    #[test]
    fn test_empty_cookie_set_is_not_usable() {
        let state = SessionState::default();
        assert!(!state.is_usable(Utc::now()));
    }

    #[test]
    fn test_expired_cookie_is_not_usable() {
        let state = SessionState::new(vec![
            cookie("session-id", None),
            cookie("at-main", Some(1000.0)),
        ]);
        assert!(!state.is_usable(Utc::now()));
    }

    #[test]
    fn test_session_cookies_have_no_deadline() {
        let state = SessionState::new(vec![cookie("session-id", Some(-1.0)), cookie("x", None)]);
        assert!(state.is_usable(Utc::now()));
    }

    #[test]
    fn test_remove_clears_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("auth_state.json"));
        store
            .save(&SessionState::new(vec![cookie("a", None)]))
            .unwrap();
        assert!(store.path().exists());
        store.remove();
        assert!(!store.path().exists());
    }
}
