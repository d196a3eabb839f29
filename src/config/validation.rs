use crate::config::types::{BrokerConfig, Config, FetchConfig, RobotsConfig, WorkerConfig};
use crate::ConfigError;
use url::Url;

/// Thirty days
const MAX_ROBOTS_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_broker_config(&config.broker)?;
    validate_fetch_config(&config.fetch)?;
    validate_robots_config(&config.robots)?;
    validate_worker_config(&config.worker)?;
    Ok(())
}

/// Validates broker configuration
fn validate_broker_config(config: &BrokerConfig) -> Result<(), ConfigError> {
    if config.host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "broker host cannot be empty".to_string(),
        ));
    }

    if config.port == 0 {
        return Err(ConfigError::Validation(
            "broker port must be non-zero".to_string(),
        ));
    }

    if config.queue_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "queue_name cannot be empty".to_string(),
        ));
    }

    // AMQP short strings are limited to 255 bytes
    if config.queue_name.len() > 255 {
        return Err(ConfigError::Validation(format!(
            "queue_name must be at most 255 bytes, got {}",
            config.queue_name.len()
        )));
    }

    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout_seconds must be >= 1, got {}",
            config.timeout_seconds
        )));
    }

    if config.max_retries < 1 || config.max_retries > 20 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be between 1 and 20, got {}",
            config.max_retries
        )));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_max_ms ({}) must be >= backoff_base_ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    for proxy in &config.proxies {
        validate_proxy_url(proxy)?;
    }

    Ok(())
}

/// Validates a proxy endpoint of the form scheme://host:port
fn validate_proxy_url(proxy: &str) -> Result<(), ConfigError> {
    let url = Url::parse(proxy)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy URL '{}': {}", proxy, e)))?;

    if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
        return Err(ConfigError::InvalidUrl(format!(
            "Proxy URL '{}' must use http, https, or socks5",
            proxy
        )));
    }

    if url.host_str().is_none() || url.port_or_known_default().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Proxy URL '{}' must name a host and port",
            proxy
        )));
    }

    Ok(())
}

/// Validates robots configuration
fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.cache_ttl_seconds < 1 || config.cache_ttl_seconds > MAX_ROBOTS_TTL_SECONDS {
        return Err(ConfigError::Validation(format!(
            "robots cache_ttl_seconds must be between 1 and {}, got {}",
            MAX_ROBOTS_TTL_SECONDS, config.cache_ttl_seconds
        )));
    }

    Ok(())
}

/// Validates worker configuration
fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    if config.source_tag.trim().is_empty() {
        return Err(ConfigError::Validation(
            "source_tag cannot be empty".to_string(),
        ));
    }

    if config.max_concurrent_targets < 1 || config.max_concurrent_targets > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_targets must be between 1 and 64, got {}",
            config.max_concurrent_targets
        )));
    }

    for target in &config.targets {
        let url = Url::parse(target).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid target URL '{}': {}", target, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Target URL '{}' must use http or https",
                target
            )));
        }
    }

    Ok(())
}
