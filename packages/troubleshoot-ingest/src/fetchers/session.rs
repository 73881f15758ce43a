//! Cookie session persistence.
//!
//! Cookies are stored per origin as name/value pairs in a JSON file with
//! owner-only permissions, and restored into a fresh jar on the next run.

use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
#[cfg(unix)]
use std::{io::Write, os::unix::fs::OpenOptionsExt};
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Serialized cookie state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub saved_at: Option<DateTime<Utc>>,
    /// origin → sorted (name, value) pairs
    pub origins: BTreeMap<String, Vec<(String, String)>>,
}

impl SessionState {
    /// Snapshot the jar's cookies for each of the given URLs' origins.
    pub fn capture(jar: &Jar, urls: &[Url]) -> Self {
        let mut origins = BTreeMap::new();
        for url in urls {
            let origin = url.origin().ascii_serialization();
            if origins.contains_key(&origin) {
                continue;
            }
            let Some(header) = jar.cookies(url) else {
                continue;
            };
            let Ok(header) = header.to_str() else {
                continue;
            };
            let cookies = parse_cookie_header(header);
            if !cookies.is_empty() {
                origins.insert(origin, cookies);
            }
        }

        Self {
            saved_at: Some(Utc::now()),
            origins,
        }
    }

    /// Add every stored cookie to the jar.
    pub fn restore_into(&self, jar: &Jar) -> usize {
        let mut restored = 0;
        for (origin, cookies) in &self.origins {
            let Ok(url) = Url::parse(origin) else {
                continue;
            };
            for (name, value) in cookies {
                jar.add_cookie_str(&format!("{}={}; Path=/", name, value), &url);
                restored += 1;
            }
        }
        restored
    }

    pub fn is_empty(&self) -> bool {
        self.origins.values().all(|c| c.is_empty())
    }

    /// Load a session file; a missing file is `Ok(None)`.
    pub fn load(path: &Path) -> AuthResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AuthError::Session(format!("{}: {}", path.display(), e)))?;
        let state = serde_json::from_str(&raw)
            .map_err(|e| AuthError::Session(format!("{}: {}", path.display(), e)))?;
        Ok(Some(state))
    }

    pub fn save(&self, path: &Path) -> AuthResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AuthError::Session(e.to_string()))?;
        secure_write(path, &content)
            .map_err(|e| AuthError::Session(format!("{}: {}", path.display(), e)))
    }
}

fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    let mut cookies = header
        .split(';')
        .filter_map(|segment| {
            let (name, value) = segment.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect::<Vec<_>>();
    cookies.sort();
    cookies
}

fn secure_write(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    #[cfg(unix)]
    {
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?
            .write_all(content.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, content)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("WC_SESSION=abc; JSESSIONID=x=y; ; =bad");
        assert_eq!(
            cookies,
            vec![
                ("JSESSIONID".to_string(), "x=y".to_string()),
                ("WC_SESSION".to_string(), "abc".to_string()),
            ]
        );
    }

    #[test]
    fn test_capture_and_restore_through_file() {
        let url = Url::parse("https://dealer.example.com/shop/home").unwrap();
        let jar = Jar::default();
        jar.add_cookie_str("WC_SESSION=abc; Path=/", &url);
        jar.add_cookie_str("WC_USER=42; Path=/", &url);

        let state = SessionState::capture(&jar, &[url.clone(), url.clone()]);
        assert_eq!(state.origins.len(), 1);
        assert!(!state.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions").join("dealer.json");
        state.save(&path).unwrap();

        let loaded = SessionState::load(&path).unwrap().unwrap();
        assert_eq!(loaded.origins, state.origins);

        let fresh = Jar::default();
        assert_eq!(loaded.restore_into(&fresh), 2);
        let header = fresh.cookies(&url).unwrap();
        let header = header.to_str().unwrap();
        assert!(header.contains("WC_SESSION=abc"));
        assert!(header.contains("WC_USER=42"));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SessionState::load(&dir.path().join("none.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_corrupt_file_is_session_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            SessionState::load(&path),
            Err(AuthError::Session(_))
        ));
    }
}
