//! HTTP fetcher implementation
//!
//! This module handles all page requests for the worker, including:
//! - Building HTTP clients (direct and one per proxy endpoint)
//! - Robots.txt gating before the first request
//! - Bounded retry with exponential backoff
//! - Error classification into [`FetchError`]

use crate::config::FetchConfig;
use crate::ingest::PageSource;
use crate::proxy::{ProxyEndpoint, ProxyPool};
use crate::robots::RobotsGate;
use crate::{FetchError, FetchResult, IngestError};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome classification of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Timeout,
    HttpError,
    ConnectionError,
    ContentFetchError,
    Cancelled,
}

impl AttemptOutcome {
    fn classify(result: &FetchResult<(u16, String)>) -> (Self, Option<u16>) {
        match result {
            Ok((status, _)) => (Self::Success, Some(*status)),
            Err(FetchError::Timeout { .. }) => (Self::Timeout, None),
            Err(FetchError::HttpError { status, .. }) => (Self::HttpError, Some(*status)),
            Err(FetchError::ContentFetchError { .. }) => (Self::ContentFetchError, None),
            Err(FetchError::Cancelled { .. }) => (Self::Cancelled, None),
            Err(FetchError::ConnectionError { .. } | FetchError::Blocked { .. }) => {
                (Self::ConnectionError, None)
            }
        }
    }

    /// What this outcome says about the proxy that carried the request
    ///
    /// `Some(true)` clears the proxy's failure streak and `Some(false)` extends
    /// it. A body that broke off mid-read or a cancelled request leaves the
    /// streak untouched.
    fn proxy_verdict(self) -> Option<bool> {
        match self {
            Self::Success | Self::HttpError => Some(true),
            Self::Timeout | Self::ConnectionError => Some(false),
            Self::ContentFetchError | Self::Cancelled => None,
        }
    }
}

/// Record of one request, kept for retry accounting and logging
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub url: String,
    pub proxy_used: Option<ProxyEndpoint>,
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
    pub status_code: Option<u16>,
}

impl FetchAttempt {
    fn log(&self) {
        let proxy = self
            .proxy_used
            .as_ref()
            .map(|p| p.url())
            .unwrap_or("direct");
        match self.outcome {
            AttemptOutcome::Success => tracing::debug!(
                url = %self.url,
                proxy,
                attempt = self.attempt_number,
                status = ?self.status_code,
                "Fetch attempt succeeded"
            ),
            outcome => tracing::debug!(
                url = %self.url,
                proxy,
                attempt = self.attempt_number,
                status = ?self.status_code,
                "Fetch attempt failed: {:?}",
                outcome
            ),
        }
    }
}

/// Builds an HTTP client with the configured user agent and timeout
///
/// # Arguments
///
/// * `config` - The fetch configuration
/// * `proxy` - Route every request through this endpoint, or connect directly
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client (e.g. unsupported proxy scheme)
pub fn build_http_client(
    config: &FetchConfig,
    proxy: Option<&ProxyEndpoint>,
) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_secs(config.timeout_seconds);

    let builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    let builder = match proxy {
        Some(endpoint) => builder.proxy(Proxy::all(endpoint.url())?),
        None => builder.no_proxy(),
    };

    builder.build()
}

/// Computes the backoff delay after a failed attempt
///
/// Attempt 1 waits `base`, attempt 2 waits `2 * base`, and so on, never
/// exceeding `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

/// Retrieves pages over HTTP through the robots gate and proxy pool
///
/// Cloning is cheap: HTTP clients, the pool and the gate are shared.
#[derive(Clone)]
pub struct Fetcher {
    direct: Client,
    proxied: HashMap<ProxyEndpoint, Client>,
    proxies: Arc<ProxyPool>,
    robots: Arc<RobotsGate>,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    cancel: CancellationToken,
}

impl Fetcher {
    /// Creates a fetcher, building one HTTP client per proxy endpoint
    pub fn new(
        config: &FetchConfig,
        proxies: Arc<ProxyPool>,
        robots: Arc<RobotsGate>,
    ) -> Result<Self, IngestError> {
        let direct = build_http_client(config, None)?;

        let mut proxied = HashMap::new();
        for endpoint in proxies.endpoints() {
            let client = build_http_client(config, Some(endpoint))?;
            proxied.insert(endpoint.clone(), client);
        }

        Ok(Self {
            direct,
            proxied,
            proxies,
            robots,
            max_attempts: config.max_retries.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            cancel: CancellationToken::new(),
        })
    }

    /// Attaches a cancellation token observed during requests and backoff sleeps
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Fetches a page after checking robots.txt
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | robots.txt disallows | Immediate → Blocked |
    /// | Timeout | Retry with backoff |
    /// | Connection failure | Retry with backoff |
    /// | Body read failure | Retry with backoff |
    /// | HTTP 429, 5xx | Retry with backoff |
    /// | Other HTTP 4xx | Immediate → HttpError |
    /// | Attempts exhausted | Last classified error |
    pub async fn fetch(&self, url: &str) -> FetchResult<String> {
        if !self.robots.allowed(url).await {
            tracing::info!("URL {} disallowed by robots.txt", url);
            return Err(FetchError::Blocked {
                url: url.to_string(),
            });
        }

        self.fetch_with_retry(url).await
    }

    /// Fetches a page with retry and backoff, without consulting robots.txt
    pub async fn fetch_with_retry(&self, url: &str) -> FetchResult<String> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled {
                    url: url.to_string(),
                });
            }

            match self.attempt(url, attempt).await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt < self.max_attempts {
                        let delay = backoff_delay(attempt, self.backoff_base, self.backoff_max);
                        tracing::warn!(
                            "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                            attempt,
                            self.max_attempts,
                            url,
                            e,
                            delay
                        );
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                return Err(FetchError::Cancelled { url: url.to_string() });
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        tracing::warn!(
                            "Attempt {}/{} for {} failed ({}), giving up",
                            attempt,
                            self.max_attempts,
                            url,
                            e
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::ConnectionError {
            url: url.to_string(),
            message: "no attempts made".to_string(),
        }))
    }

    /// Issues one request through a freshly selected proxy
    async fn attempt(&self, url: &str, attempt_number: u32) -> FetchResult<String> {
        let proxy = self.proxies.select();
        let client = match &proxy {
            Some(endpoint) => match self.proxied.get(endpoint) {
                Some(client) => client,
                None => {
                    tracing::warn!("No client built for proxy {}, connecting directly", endpoint);
                    &self.direct
                }
            },
            None => &self.direct,
        };

        let result = self.request(client, url).await;

        let (outcome, status_code) = AttemptOutcome::classify(&result);

        if let Some(endpoint) = &proxy {
            match outcome.proxy_verdict() {
                Some(true) => self.proxies.record_success(endpoint),
                Some(false) => self.proxies.record_failure(endpoint),
                None => {}
            }
        }

        FetchAttempt {
            url: url.to_string(),
            proxy_used: proxy,
            attempt_number,
            outcome,
            status_code,
        }
        .log();

        result.map(|(_, body)| body)
    }

    /// Sends the GET request and reads the body, honoring cancellation
    async fn request(&self, client: &Client, url: &str) -> FetchResult<(u16, String)> {
        let response = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            result = client.get(url).send() => result,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => return Err(classify_transport_error(url, &e)),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            body = response.text() => body,
        };

        body.map(|body| (status.as_u16(), body)).map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::ContentFetchError {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}

/// Classifies a reqwest send error
fn classify_transport_error(url: &str, e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::ConnectionError {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl PageSource for Fetcher {
    async fn allowed(&self, url: &str) -> bool {
        self.robots.allowed(url).await
    }

    async fn retrieve(&self, url: &str) -> FetchResult<String> {
        self.fetch_with_retry(url).await
    }
}
