//! robots.txt rules, fetched once per host.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// One `User-agent` group.
#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    /// (path prefix, allowed)
    rules: Vec<(String, bool)>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<Group>,
}

impl RobotsRules {
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut in_agent_lines = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // Consecutive agent lines share one group.
                    if !in_agent_lines && !current.agents.is_empty() {
                        groups.push(std::mem::take(&mut current));
                    }
                    current.agents.push(value.to_lowercase());
                    in_agent_lines = true;
                }
                "disallow" | "allow" => {
                    in_agent_lines = false;
                    if !value.is_empty() {
                        current.rules.push((value.to_string(), key == "allow"));
                    }
                }
                "crawl-delay" => {
                    in_agent_lines = false;
                    current.crawl_delay = value.parse().ok();
                }
                _ => {}
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }

        Self { groups }
    }

    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let agent = user_agent.to_lowercase();
        self.groups
            .iter()
            .find(|g| g.agents.iter().any(|a| a != "*" && agent.contains(a.as_str())))
            .or_else(|| self.groups.iter().find(|g| g.agents.iter().any(|a| a == "*")))
    }

    /// Longest matching prefix decides; `Allow` wins a tie.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        group
            .rules
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, allowed)| (prefix.len(), *allowed))
            .map(|(_, allowed)| *allowed)
            .unwrap_or(true)
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .and_then(|g| g.crawl_delay)
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// Per-host robots.txt cache.
#[derive(Default)]
pub struct RobotsCache {
    hosts: Mutex<HashMap<String, RobotsRules>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for the URL's origin, fetching them on first use. An unreachable
    /// or missing robots.txt allows everything.
    pub async fn rules_for(&self, client: &reqwest::Client, url: &Url) -> RobotsRules {
        let origin = url.origin().ascii_serialization();
        let mut hosts = self.hosts.lock().await;
        if let Some(rules) = hosts.get(&origin) {
            return rules.clone();
        }

        let robots_url = format!("{}/robots.txt", origin);
        let rules = match client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => RobotsRules::parse(&body),
                Err(_) => RobotsRules::default(),
            },
            Ok(resp) => {
                debug!(url = %robots_url, status = %resp.status(), "No robots.txt");
                RobotsRules::default()
            }
            Err(e) => {
                debug!(url = %robots_url, error = %e, "robots.txt unreachable");
                RobotsRules::default()
            }
        };

        hosts.insert(origin, rules.clone());
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = r#"
# comment
User-agent: Googlebot
User-agent: Bingbot
Disallow: /

User-agent: *
Disallow: /shop/
Allow: /shop/en/snapav/product-files
Crawl-delay: 5
"#;

    #[test]
    fn test_grouped_agents_share_rules() {
        let robots = RobotsRules::parse(ROBOTS);
        assert!(!robots.is_allowed("Googlebot/2.1", "/docs"));
        assert!(!robots.is_allowed("bingbot", "/docs"));
    }

    #[test]
    fn test_longest_match_wins() {
        let robots = RobotsRules::parse(ROBOTS);
        assert!(robots.is_allowed("Mozilla/5.0", "/docs/troubleshooting"));
        assert!(!robots.is_allowed("Mozilla/5.0", "/shop/cart"));
        assert!(robots.is_allowed("Mozilla/5.0", "/shop/en/snapav/product-files-videos-search"));
    }

    #[test]
    fn test_crawl_delay() {
        let robots = RobotsRules::parse(ROBOTS);
        assert_eq!(robots.crawl_delay("Mozilla/5.0"), Some(Duration::from_secs(5)));
        assert_eq!(robots.crawl_delay("Googlebot"), None);
    }

    #[test]
    fn test_empty_allows_everything() {
        let robots = RobotsRules::parse("");
        assert!(robots.is_allowed("anything", "/private"));
        assert_eq!(robots.crawl_delay("anything"), None);
    }
}
