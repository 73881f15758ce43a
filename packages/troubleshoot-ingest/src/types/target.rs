//! Declarative per-site target definitions, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::extract::rules::ExtractionRules;

/// One scraping target: where to start, how to log in, how to page, and how
/// to turn each page into items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,

    /// Brand tag stored on every row and vector (e.g. "Control4").
    pub brand: String,

    pub start_urls: Vec<String>,

    #[serde(default)]
    pub login: Option<LoginConfig>,

    #[serde(default)]
    pub pagination: PaginationRule,

    pub rules: ExtractionRules,

    /// Minimum delay between requests (milliseconds).
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Extra attempts per page after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub respect_robots: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Form login settings. Credentials are named by environment variable only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    pub login_url: String,

    #[serde(default = "default_form_selector")]
    pub form_selector: String,

    pub username_field: String,
    pub password_field: String,
    pub username_env: String,
    pub password_env: String,

    /// Fallback submission endpoint when posting to the form action fails.
    #[serde(default)]
    pub submit_url: Option<String>,

    /// Fixed values forced into the form (hidden store/catalog ids etc).
    #[serde(default)]
    pub extra_fields: BTreeMap<String, String>,

    /// A URL containing any of these (case-insensitive) is a login location.
    #[serde(default = "default_login_markers")]
    pub login_markers: Vec<String>,

    /// Where cookies are persisted between runs.
    #[serde(default)]
    pub session_file: Option<String>,

    /// Protected page used to check a restored session. Defaults to the
    /// first start URL.
    #[serde(default)]
    pub probe_url: Option<String>,
}

impl LoginConfig {
    pub fn is_login_location(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.login_markers
            .iter()
            .any(|m| !m.is_empty() && lower.contains(&m.to_lowercase()))
    }
}

/// How to follow "next page" links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationRule {
    /// CSS selector for the next-page link. `None` disables pagination.
    #[serde(default)]
    pub next_selector: Option<String>,

    /// Upper bound on pages fetched per start URL.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for PaginationRule {
    fn default() -> Self {
        Self {
            next_selector: None,
            max_pages: default_max_pages(),
        }
    }
}

fn default_delay_ms() -> u64 {
    3_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36".to_string()
}

fn default_form_selector() -> String {
    "form".to_string()
}

fn default_login_markers() -> Vec<String> {
    vec!["logonform".to_string(), "login".to_string()]
}

fn default_max_pages() -> usize {
    50
}

impl TargetConfig {
    /// Load a target definition from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let target = Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        target.validate()?;
        Ok(target)
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Checks that do not need the network: URLs parse, selectors compile.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.start_urls.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: format!("{}.start_urls", self.name),
                reason: "at least one start URL is required".into(),
            });
        }
        for url in &self.start_urls {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                name: format!("{}.start_urls", self.name),
                reason: format!("{}: {}", url, e),
            })?;
        }
        if self.pagination.max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                name: format!("{}.pagination.max_pages", self.name),
                reason: "must be at least 1".into(),
            });
        }
        self.rules.compile()?;
        if let Some(next) = &self.pagination.next_selector {
            crate::extract::rules::parse_selector(next)?;
        }
        if let Some(login) = &self.login {
            crate::extract::rules::parse_selector(&login.form_selector)?;
        }
        Ok(())
    }
}
