//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files, and the [`RobotsGate`] that answers allow/deny for a
//! URL before any page is fetched.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::{agent_token, MalformedRobots, ParsedRobots};

use crate::config::{FetchConfig, RobotsConfig};
use crate::ingest::build_http_client;
use crate::IngestError;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

/// Why robots.txt could not be turned into a ruleset
#[derive(Debug)]
pub enum RobotsFetchError {
    /// The server answered 429 or a 5xx status
    Status(u16),
    /// Network failure, timeout, or unreadable body
    Transport(String),
    /// The body is not valid UTF-8
    Encoding(String),
    /// The body holds no robots.txt directives
    Malformed(MalformedRobots),
}

impl std::fmt::Display for RobotsFetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(status) => write!(f, "HTTP {}", status),
            Self::Transport(message) => write!(f, "{}", message),
            Self::Encoding(message) => write!(f, "body is not UTF-8: {}", message),
            Self::Malformed(malformed) => {
                write!(f, "no robots.txt directives (starts with {:?})", malformed.first_line)
            }
        }
    }
}

type CacheKey = (String, String);
type CacheSlot = Arc<tokio::sync::Mutex<Option<CachedRobots>>>;

/// Access-policy check derived from each site's robots.txt
///
/// Decisions are cached per (site origin, user-agent token). Each cache slot
/// has its own async lock, so concurrent first checks for one site trigger a
/// single robots.txt fetch while the other callers wait for its result.
pub struct RobotsGate {
    client: Client,
    user_agent: String,
    default_deny: bool,
    ttl: chrono::Duration,
    cache: Mutex<HashMap<CacheKey, CacheSlot>>,
}

impl RobotsGate {
    /// Creates a gate that fetches robots.txt with the fetch timeout and user agent
    pub fn new(fetch: &FetchConfig, robots: &RobotsConfig) -> Result<Self, IngestError> {
        let client = build_http_client(fetch, None)?;
        Ok(Self::with_client(
            client,
            &fetch.user_agent,
            robots.default_deny,
            robots.cache_ttl_seconds,
        ))
    }

    /// Creates a gate around an existing HTTP client
    pub fn with_client(
        client: Client,
        user_agent: &str,
        default_deny: bool,
        cache_ttl_seconds: u64,
    ) -> Self {
        let ttl_seconds = i64::try_from(cache_ttl_seconds)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        Self {
            client,
            user_agent: user_agent.to_string(),
            default_deny,
            ttl: chrono::Duration::seconds(ttl_seconds),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The policy applied when robots.txt cannot be retrieved
    pub fn default_deny(&self) -> bool {
        self.default_deny
    }

    /// Checks `url` against robots.txt for the gate's own user agent
    pub async fn allowed(&self, url: &str) -> bool {
        self.allowed_for(url, &self.user_agent).await
    }

    /// Checks `url` against robots.txt for `user_agent`
    ///
    /// # Returns
    ///
    /// * `true` - The ruleset allows the URL, or the site publishes no robots.txt
    /// * `false` - The ruleset disallows it, the URL is malformed, or robots.txt
    ///   is unreachable and the gate defaults to deny
    pub async fn allowed_for(&self, url: &str, user_agent: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Denying malformed URL {}: {}", url, e);
                return false;
            }
        };

        let origin = parsed.origin();
        if !origin.is_tuple() {
            tracing::warn!("Denying URL without a network origin: {}", url);
            return false;
        }
        let site = origin.ascii_serialization();
        let token = agent_token(user_agent).to_string();

        let slot = self.slot_for((site.clone(), token.clone()));
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if !cached.is_expired() {
                return cached.is_allowed(url, &token);
            }
            tracing::debug!("Cached robots.txt for {} expired, refetching", site);
        }

        match fetch_robots(&self.client, &site).await {
            Ok(robots) => {
                let cached = CachedRobots::new(robots, self.ttl);
                let allowed = cached.is_allowed(url, &token);
                *entry = Some(cached);
                allowed
            }
            Err(e) => {
                tracing::warn!(
                    "Could not retrieve robots.txt for {} ({}), {}",
                    site,
                    e,
                    if self.default_deny { "denying" } else { "allowing" }
                );
                !self.default_deny
            }
        }
    }

    /// Returns the cached decision record for a site, if one exists
    pub async fn cached(&self, site: &str, user_agent: &str) -> Option<CachedRobots> {
        let key = (site.to_string(), agent_token(user_agent).to_string());
        let slot = {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.get(&key).cloned()
        }?;
        let entry = slot.lock().await;
        entry.clone()
    }

    fn slot_for(&self, key: CacheKey) -> CacheSlot {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.entry(key).or_default().clone()
    }
}

/// Fetches and parses robots.txt for a site origin
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `site` - The site origin (e.g. "https://example.com")
///
/// # Returns
///
/// * `Ok(ParsedRobots)` - The parsed ruleset; allow-all when the server
///   answers 4xx other than 429 (no robots.txt published)
/// * `Err(RobotsFetchError)` - 429, 5xx, network failure, timeout, or a
///   body that is not UTF-8 or carries no directives
pub async fn fetch_robots(client: &Client, site: &str) -> Result<ParsedRobots, RobotsFetchError> {
    let robots_url = format!("{}/robots.txt", site.trim_end_matches('/'));
    tracing::debug!("Fetching {}", robots_url);

    let response = client
        .get(&robots_url)
        .send()
        .await
        .map_err(|e| RobotsFetchError::Transport(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS
        || !(status.is_success() || status.is_client_error())
    {
        return Err(RobotsFetchError::Status(status.as_u16()));
    }
    if status.is_client_error() {
        tracing::debug!("No robots.txt at {} (HTTP {})", site, status.as_u16());
        return Ok(ParsedRobots::AllowAll);
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| RobotsFetchError::Transport(e.to_string()))?;
    let body =
        std::str::from_utf8(&bytes).map_err(|e| RobotsFetchError::Encoding(e.to_string()))?;

    ParsedRobots::parse(body).map_err(RobotsFetchError::Malformed)
}
