//! Proxy pool implementation
//!
//! Selection is uniform-random over the configured endpoints. Health tracking
//! is opt-in and purely additive: a benched endpoint stays in the pool and is
//! only skipped while its cooldown runs.

use crate::config::FetchConfig;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// An outbound proxy endpoint (scheme://host:port)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    url: String,
}

impl ProxyEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Health bookkeeping for a single endpoint
#[derive(Debug, Clone, Default)]
struct ProxyHealth {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// The set of outbound proxies available to the fetcher
///
/// The endpoint set is fixed at construction. `select` may be called from
/// any number of tasks at once.
#[derive(Debug)]
pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    health: Mutex<HashMap<ProxyEndpoint, ProxyHealth>>,
    /// Consecutive failures before an endpoint is benched; 0 disables benching
    failure_threshold: u32,
    cooldown: Duration,
}

impl ProxyPool {
    /// Creates a pool without health-based exclusion
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self {
            endpoints,
            health: Mutex::new(HashMap::new()),
            failure_threshold: 0,
            cooldown: Duration::ZERO,
        }
    }

    /// Creates a pool from the fetch configuration
    pub fn from_config(config: &FetchConfig) -> Self {
        let endpoints = config.proxies.iter().map(ProxyEndpoint::new).collect();
        Self::new(endpoints).with_health_tracking(
            config.proxy_failure_threshold,
            Duration::from_secs(config.proxy_cooldown_seconds),
        )
    }

    /// Enables benching of endpoints after `threshold` consecutive failures
    pub fn with_health_tracking(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.failure_threshold = threshold;
        self.cooldown = cooldown;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn endpoints(&self) -> &[ProxyEndpoint] {
        &self.endpoints
    }

    /// Selects an endpoint for the next fetch attempt
    ///
    /// # Returns
    ///
    /// * `Some(ProxyEndpoint)` - A uniformly chosen (healthy, when tracking) endpoint
    /// * `None` - The pool is empty; the fetch should go direct
    pub fn select(&self) -> Option<ProxyEndpoint> {
        if self.endpoints.is_empty() {
            return None;
        }

        let candidates: Vec<&ProxyEndpoint> = if self.failure_threshold == 0 {
            self.endpoints.iter().collect()
        } else {
            let health = self.health.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let healthy: Vec<&ProxyEndpoint> = self
                .endpoints
                .iter()
                .filter(|ep| !self.is_benched(health.get(*ep), now))
                .collect();

            if healthy.is_empty() {
                tracing::warn!("All {} proxies are benched, selecting from full pool", self.len());
                self.endpoints.iter().collect()
            } else {
                healthy
            }
        };

        let index = rand::rng().random_range(0..candidates.len());
        Some(candidates[index].clone())
    }

    /// Records a transport-level failure through `endpoint`
    pub fn record_failure(&self, endpoint: &ProxyEndpoint) {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        let entry = health.entry(endpoint.clone()).or_default();
        entry.consecutive_failures += 1;
        entry.last_failure = Some(Instant::now());

        if self.failure_threshold > 0 && entry.consecutive_failures == self.failure_threshold {
            tracing::warn!(
                proxy = %endpoint,
                failures = entry.consecutive_failures,
                "Benching proxy for {:?}",
                self.cooldown
            );
        }
    }

    /// Records a completed exchange through `endpoint`, clearing its failure streak
    pub fn record_success(&self, endpoint: &ProxyEndpoint) {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = health.get_mut(endpoint) {
            entry.consecutive_failures = 0;
        }
    }

    /// Returns the current consecutive failure count for `endpoint`
    pub fn consecutive_failures(&self, endpoint: &ProxyEndpoint) -> u32 {
        let health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        health
            .get(endpoint)
            .map(|h| h.consecutive_failures)
            .unwrap_or(0)
    }

    /// Returns true if `endpoint` is currently eligible for selection
    pub fn is_healthy(&self, endpoint: &ProxyEndpoint) -> bool {
        if self.failure_threshold == 0 {
            return true;
        }
        let health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        !self.is_benched(health.get(endpoint), Instant::now())
    }

    fn is_benched(&self, health: Option<&ProxyHealth>, now: Instant) -> bool {
        match health {
            Some(h) if h.consecutive_failures >= self.failure_threshold => h
                .last_failure
                .map(|at| now.duration_since(at) < self.cooldown)
                .unwrap_or(false),
            _ => false,
        }
    }
}
