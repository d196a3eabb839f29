//! Configuration module for Listing-Ingest
//!
//! Configuration is assembled once at process start from built-in defaults,
//! an optional TOML file and environment variables, then handed to each
//! component constructor.
//!
//! # Example
//!
//! ```no_run
//! use listing_ingest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Some(Path::new("ingest.toml"))).unwrap();
//! println!("Fetch attempts per page: {}", config.fetch.max_retries);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{BrokerConfig, Config, FetchConfig, RobotsConfig, WorkerConfig};

// Re-export parser functions
pub use parser::{apply_env_overrides, load_config, load_config_with, load_file};
pub use validation::validate;
