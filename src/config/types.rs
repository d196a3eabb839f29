use serde::Deserialize;

/// Main configuration structure for Listing-Ingest
///
/// Every section has defaults, so an empty TOML file (or no file at all)
/// yields a usable configuration once the environment overlay is applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub fetch: FetchConfig,
    pub robots: RobotsConfig,
    pub worker: WorkerConfig,
}

/// Message broker connection and queue configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrokerConfig {
    /// Broker hostname
    pub host: String,

    /// Broker AMQP port
    pub port: u16,

    pub user: String,

    pub pass: String,

    /// Virtual host ("/" is the broker default)
    pub vhost: String,

    /// Durable queue that receives raw listings (also the routing key)
    pub queue_name: String,

    /// Wait for a broker ack on every publish
    pub publisher_confirms: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "rabbitmq_server".to_string(),
            port: 5672,
            user: "user".to_string(),
            pass: "password".to_string(),
            vhost: "/".to_string(),
            queue_name: "property_listings_raw".to_string(),
            publisher_confirms: true,
        }
    }
}

/// Page fetching configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Per-request timeout, also applied to robots.txt fetches
    pub timeout_seconds: u64,

    /// Hard cap on attempts per page
    pub max_retries: u32,

    /// First backoff delay (milliseconds), doubled per attempt
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay (milliseconds)
    pub backoff_max_ms: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Outbound proxies (scheme://host:port); empty means direct connections
    pub proxies: Vec<String>,

    /// Consecutive failures before a proxy is benched (0 disables tracking)
    pub proxy_failure_threshold: u32,

    /// How long a benched proxy stays out of rotation
    pub proxy_cooldown_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            user_agent: format!("ListingIngest/{}", env!("CARGO_PKG_VERSION")),
            proxies: Vec::new(),
            proxy_failure_threshold: 0,
            proxy_cooldown_seconds: 60,
        }
    }
}

/// Robots.txt policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RobotsConfig {
    /// Deny when robots.txt cannot be retrieved
    pub default_deny: bool,

    /// How long a fetched robots.txt stays valid
    pub cache_ttl_seconds: u64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            default_deny: true,
            cache_ttl_seconds: 24 * 60 * 60,
        }
    }
}

/// Worker pass configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorkerConfig {
    /// Listing pages to ingest, one pass each
    pub targets: Vec<String>,

    /// Provenance tag stamped on every listing
    pub source_tag: String,

    /// Number of passes allowed to run at once
    pub max_concurrent_targets: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            source_tag: "mock_craigslist".to_string(),
            max_concurrent_targets: 4,
        }
    }
}
