use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;
use std::str::FromStr;

/// Loads the configuration from an optional TOML file and the process environment
///
/// Precedence, lowest first: built-in defaults, the TOML file, environment
/// variables. The result is validated before it is returned.
///
/// # Arguments
///
/// * `path` - Optional path to a TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use listing_ingest::config::load_config;
///
/// let config = load_config(None).unwrap();
/// println!("Publishing to queue: {}", config.broker.queue_name);
/// ```
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`], reading overrides through `lookup` instead of the
/// process environment
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => Config::default(),
    };

    apply_env_overrides(&mut config, lookup)?;

    validate(&config)?;

    Ok(config)
}

/// Reads and parses a TOML configuration file without validating it
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Applies environment-style overrides onto an existing configuration
///
/// Unset variables leave the current value untouched. An empty
/// `HTTP_PROXIES` or `TARGET_URLS` clears the corresponding list.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("BROKER_HOST") {
        config.broker.host = v;
    }
    if let Some(v) = lookup("BROKER_PORT") {
        config.broker.port = parse_value("BROKER_PORT", &v)?;
    }
    if let Some(v) = lookup("BROKER_USER") {
        config.broker.user = v;
    }
    if let Some(v) = lookup("BROKER_PASS") {
        config.broker.pass = v;
    }
    if let Some(v) = lookup("BROKER_VHOST") {
        config.broker.vhost = v;
    }
    if let Some(v) = lookup("QUEUE_NAME") {
        config.broker.queue_name = v;
    }
    if let Some(v) = lookup("PUBLISHER_CONFIRMS") {
        config.broker.publisher_confirms = parse_bool("PUBLISHER_CONFIRMS", &v)?;
    }

    if let Some(v) = lookup("HTTP_PROXIES") {
        config.fetch.proxies = split_list(&v);
    }
    if let Some(v) = lookup("PROXY_FAILURE_THRESHOLD") {
        config.fetch.proxy_failure_threshold = parse_value("PROXY_FAILURE_THRESHOLD", &v)?;
    }
    if let Some(v) = lookup("PROXY_COOLDOWN_SECONDS") {
        config.fetch.proxy_cooldown_seconds = parse_value("PROXY_COOLDOWN_SECONDS", &v)?;
    }
    if let Some(v) = lookup("FETCH_TIMEOUT_SECONDS") {
        config.fetch.timeout_seconds = parse_value("FETCH_TIMEOUT_SECONDS", &v)?;
    }
    if let Some(v) = lookup("FETCH_MAX_RETRIES") {
        config.fetch.max_retries = parse_value("FETCH_MAX_RETRIES", &v)?;
    }
    if let Some(v) = lookup("FETCH_BACKOFF_BASE_MS") {
        config.fetch.backoff_base_ms = parse_value("FETCH_BACKOFF_BASE_MS", &v)?;
    }
    if let Some(v) = lookup("FETCH_BACKOFF_MAX_MS") {
        config.fetch.backoff_max_ms = parse_value("FETCH_BACKOFF_MAX_MS", &v)?;
    }
    if let Some(v) = lookup("USER_AGENT") {
        config.fetch.user_agent = v;
    }

    if let Some(v) = lookup("ROBOTS_DEFAULT_DENY") {
        config.robots.default_deny = parse_bool("ROBOTS_DEFAULT_DENY", &v)?;
    }
    if let Some(v) = lookup("ROBOTS_CACHE_TTL_SECONDS") {
        config.robots.cache_ttl_seconds = parse_value("ROBOTS_CACHE_TTL_SECONDS", &v)?;
    }

    if let Some(v) = lookup("TARGET_URLS") {
        config.worker.targets = split_list(&v);
    }
    if let Some(v) = lookup("LISTING_SOURCE") {
        config.worker.source_tag = v;
    }
    if let Some(v) = lookup("MAX_CONCURRENT_TARGETS") {
        config.worker.max_concurrent_targets = parse_value("MAX_CONCURRENT_TARGETS", &v)?;
    }

    Ok(())
}

/// Splits a comma-separated list, dropping blank entries
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
