//! Outbound proxy rotation
//!
//! The pool is loaded once from configuration and shared by every worker
//! pass. An empty pool means pages are fetched over direct connections.

mod pool;

pub use pool::{ProxyEndpoint, ProxyPool};
