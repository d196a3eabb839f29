//! Per-site robots decision records

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// A site's ruleset together with the moment it must be refetched
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: ParsedRobots,
    pub expires_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Stamps `rules` to expire `ttl` from now
    pub fn new(rules: ParsedRobots, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            rules,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        self.rules.is_allowed(url, agent)
    }
}
