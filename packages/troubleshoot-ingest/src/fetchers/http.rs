//! HTTP fetcher: cookie-jar sessions, form login, pagination, throttling.

use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use reqwest::cookie::Jar;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::login::LoginForm;
use super::robots::RobotsCache;
use super::session::SessionState;
use crate::error::{AuthError, AuthResult, FetchError, FetchResult, Result};
use crate::extract::rules::parse_selector;
use crate::security::SiteCredentials;
use crate::traits::Fetcher;
use crate::types::{
    page::{FetchOutcome, PageFailure, RawPage},
    target::{LoginConfig, TargetConfig},
};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A fetched response body with its final location.
struct Fetched {
    final_url: Url,
    status: u16,
    body: String,
}

/// Fetches a target's pages over plain HTTP.
///
/// Built per target: credentials are resolved up front so a missing variable
/// fails before any request is made.
pub struct HttpFetcher {
    client: reqwest::Client,
    jar: Arc<Jar>,
    credentials: Option<SiteCredentials>,
    robots: RobotsCache,
    retry_backoff: Duration,
}

impl HttpFetcher {
    pub fn for_target(target: &TargetConfig) -> Result<Self> {
        let credentials = match &target.login {
            Some(login) => Some(SiteCredentials::from_env(&target.name, login)?),
            None => None,
        };
        Self::with_credentials(target, credentials)
    }

    /// Build with explicit credentials instead of reading the environment.
    pub fn with_credentials(
        target: &TargetConfig,
        credentials: Option<SiteCredentials>,
    ) -> Result<Self> {
        if target.login.is_some() && credentials.is_none() {
            let var = target
                .login
                .as_ref()
                .map(|l| l.username_env.clone())
                .unwrap_or_default();
            return Err(AuthError::MissingCredentials {
                target: target.name.clone(),
                var,
            }
            .into());
        }

        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .timeout(Duration::from_secs(target.timeout_secs.max(1)))
            .user_agent(target.user_agent.clone())
            .build()
            .map_err(FetchError::Http)?;

        Ok(Self {
            client,
            jar,
            credentials,
            robots: RobotsCache::new(),
            retry_backoff: Duration::from_secs(1),
        })
    }

    /// Base delay for linear retry backoff (attempt n waits n × this).
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    async fn throttle(limiter: Option<&DirectRateLimiter>) {
        if let Some(limiter) = limiter {
            limiter.until_ready().await;
        }
    }

    /// One GET, no retries.
    async fn get_once(&self, limiter: Option<&DirectRateLimiter>, url: &Url) -> FetchResult<Fetched> {
        Self::throttle(limiter).await;
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        let final_url = response.url().clone();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(Fetched {
            final_url,
            status: status.as_u16(),
            body,
        })
    }

    /// GET with linear-backoff retries. A redirect to the login location is
    /// an expired session and is not retried.
    async fn get_page(
        &self,
        limiter: Option<&DirectRateLimiter>,
        target: &TargetConfig,
        url: &Url,
    ) -> FetchResult<Fetched> {
        let attempts = target.max_retries + 1;
        let mut attempt = 1;
        loop {
            let result = self.get_once(limiter, url).await.and_then(|fetched| {
                match &target.login {
                    Some(login) if login.is_login_location(fetched.final_url.as_str()) => {
                        Err(FetchError::SessionExpired {
                            url: url.to_string(),
                        })
                    }
                    _ => Ok(fetched),
                }
            });

            match result {
                Ok(fetched) => return Ok(fetched),
                Err(e) if attempt < attempts && is_retryable(&e) => {
                    warn!(url = %url, attempt, error = %e, "Fetch failed, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Restore a saved session if it still works, otherwise log in.
    async fn ensure_session(
        &self,
        limiter: Option<&DirectRateLimiter>,
        target: &TargetConfig,
        login: &LoginConfig,
    ) -> AuthResult<()> {
        let session_path = login.session_file.as_deref().map(Path::new);

        if let Some(path) = session_path {
            match SessionState::load(path) {
                Ok(Some(state)) if !state.is_empty() => {
                    let restored = state.restore_into(&self.jar);
                    debug!(target = %target.name, cookies = restored, "Restored saved session");
                    if self.probe_session(limiter, target, login).await {
                        info!(target = %target.name, "Reusing saved session");
                        return Ok(());
                    }
                    info!(target = %target.name, "Saved session expired, logging in");
                }
                Ok(_) => {}
                Err(e) => warn!(target = %target.name, error = %e, "Ignoring unreadable session file"),
            }
        }

        self.login(limiter, target, login).await?;

        if let Some(path) = session_path {
            let mut urls: Vec<Url> = target
                .start_urls
                .iter()
                .filter_map(|u| Url::parse(u).ok())
                .collect();
            if let Ok(login_url) = Url::parse(&login.login_url) {
                urls.push(login_url);
            }
            let state = SessionState::capture(&self.jar, &urls);
            match state.save(path) {
                Ok(()) => info!(path = %path.display(), "Session saved"),
                Err(e) => warn!(error = %e, "Failed to save session"),
            }
        }
        Ok(())
    }

    /// True when the protected page loads without bouncing to the login page.
    async fn probe_session(
        &self,
        limiter: Option<&DirectRateLimiter>,
        target: &TargetConfig,
        login: &LoginConfig,
    ) -> bool {
        let probe = login
            .probe_url
            .as_deref()
            .or_else(|| target.start_urls.first().map(String::as_str))
            .and_then(|u| Url::parse(u).ok());
        let Some(probe) = probe else {
            return false;
        };

        match self.get_once(limiter, &probe).await {
            Ok(fetched) => !login.is_login_location(fetched.final_url.as_str()),
            Err(e) => {
                debug!(url = %probe, error = %e, "Session probe failed");
                false
            }
        }
    }

    async fn login(
        &self,
        limiter: Option<&DirectRateLimiter>,
        target: &TargetConfig,
        login: &LoginConfig,
    ) -> AuthResult<()> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| AuthError::MissingCredentials {
                target: target.name.clone(),
                var: login.username_env.clone(),
            })?;
        let login_url = Url::parse(&login.login_url).map_err(|_| FetchError::InvalidUrl {
            url: login.login_url.clone(),
        })?;

        info!(target = %target.name, url = %login_url, "Logging in");
        let page = self.get_once(limiter, &login_url).await?;
        let form = LoginForm::from_page(&page.body, &page.final_url, login, credentials)?;
        let strategies = form.strategies(login);

        for (strategy, submit_url) in &strategies {
            Self::throttle(limiter).await;
            let response = match self
                .client
                .post(submit_url.clone())
                .form(&form.fields)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(strategy = %strategy, error = %e, "Login submission failed");
                    continue;
                }
            };

            let status = response.status();
            let landed = response.url().clone();
            if status.is_success() && !login.is_login_location(landed.as_str()) {
                info!(target = %target.name, strategy = %strategy, landed = %landed, "Login successful");
                return Ok(());
            }
            warn!(
                strategy = %strategy,
                status = %status,
                landed = %landed,
                "Login not accepted"
            );
        }

        Err(AuthError::LoginRejected {
            url: login_url.to_string(),
            attempts: strategies.len(),
        })
    }

    /// Follow one pagination chain from a start URL.
    async fn crawl_chain(
        &self,
        limiter: Option<&DirectRateLimiter>,
        target: &TargetConfig,
        next_selector: Option<&Selector>,
        start: Url,
        visited: &mut HashSet<String>,
        outcome: &mut FetchOutcome,
    ) {
        let mut current = Some(start);
        let mut depth: u32 = 0;

        while let Some(url) = current.take() {
            if depth as usize >= target.pagination.max_pages {
                debug!(url = %url, max_pages = target.pagination.max_pages, "Page limit reached");
                break;
            }
            if !visited.insert(url.to_string()) {
                debug!(url = %url, "Pagination loop detected");
                break;
            }

            if target.respect_robots {
                let rules = self.robots.rules_for(&self.client, &url).await;
                if !rules.is_allowed(&target.user_agent, url.path()) {
                    warn!(url = %url, "Disallowed by robots.txt");
                    outcome.push_failure(PageFailure::new(
                        url.as_str(),
                        FetchError::RobotsDisallowed {
                            url: url.to_string(),
                        },
                    ));
                    break;
                }
            }

            match self.get_page(limiter, target, &url).await {
                Ok(fetched) => {
                    debug!(url = %url, depth, bytes = fetched.body.len(), "Fetched page");
                    current = next_selector.and_then(|sel| next_page_url(&fetched.body, &fetched.final_url, sel));
                    outcome.push_page(RawPage {
                        url: url.to_string(),
                        final_url: fetched.final_url.to_string(),
                        status: fetched.status,
                        html: fetched.body,
                        depth,
                        fetched_at: Utc::now(),
                    });
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Page failed after retries");
                    outcome.push_failure(PageFailure::new(url.as_str(), &e));
                    break;
                }
            }
            depth += 1;
        }
    }

    /// Effective delay: the target's, raised to robots.txt crawl-delay.
    async fn request_period(&self, target: &TargetConfig, starts: &[Url]) -> Duration {
        let mut period = Duration::from_millis(target.delay_ms);
        if target.respect_robots {
            for url in starts {
                let rules = self.robots.rules_for(&self.client, url).await;
                if let Some(delay) = rules.crawl_delay(&target.user_agent) {
                    period = period.max(delay);
                }
            }
        }
        period
    }
}

fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        FetchError::Http(_) | FetchError::Timeout { .. } => true,
        _ => false,
    }
}

/// Resolve the next-page link on a page, if any.
pub fn next_page_url(html: &str, base: &Url, selector: &Selector) -> Option<Url> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript:"))
        .find_map(|href| base.join(href).ok())
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_target(&self, target: &TargetConfig) -> Result<FetchOutcome> {
        let next_selector = target
            .pagination
            .next_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?;

        let mut outcome = FetchOutcome::default();
        let mut starts = Vec::new();
        for raw in &target.start_urls {
            match Url::parse(raw) {
                Ok(url) => starts.push(url),
                Err(_) => outcome.push_failure(PageFailure::new(
                    raw.as_str(),
                    FetchError::InvalidUrl { url: raw.clone() },
                )),
            }
        }

        let period = self.request_period(target, &starts).await;
        let limiter = Quota::with_period(period).map(RateLimiter::direct);
        debug!(target = %target.name, delay_ms = period.as_millis() as u64, "Request throttle");

        if let Some(login) = &target.login {
            self.ensure_session(limiter.as_ref(), target, login).await?;
        }

        let mut visited = HashSet::new();
        for start in starts {
            self.crawl_chain(
                limiter.as_ref(),
                target,
                next_selector.as_ref(),
                start,
                &mut visited,
                &mut outcome,
            )
            .await;
        }

        info!(
            target = %target.name,
            pages = outcome.pages.len(),
            failures = outcome.failures.len(),
            "Fetch complete"
        );
        Ok(outcome)
    }
}
