//! Page sources for the worker loop

use crate::FetchResult;
use async_trait::async_trait;
use std::path::Path;

/// Somewhere the worker can get a listing page from
///
/// The worker asks `allowed` during its robots check and `retrieve` while
/// fetching, so the two steps show up as separate pass states.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Returns true if the source may be read for `url`
    async fn allowed(&self, url: &str) -> bool;

    /// Retrieves the page body for `url`
    async fn retrieve(&self, url: &str) -> FetchResult<String>;
}

/// A page held in memory, served for every target
///
/// Used for local runs against a saved listing page; no robots.txt applies.
#[derive(Debug, Clone)]
pub struct StaticPage {
    html: String,
}

impl StaticPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    /// Loads the page body from a file on disk
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let html = std::fs::read_to_string(path)?;
        tracing::info!("Loaded {} bytes of HTML from {}", html.len(), path.display());
        Ok(Self::new(html))
    }
}

#[async_trait]
impl PageSource for StaticPage {
    async fn allowed(&self, _url: &str) -> bool {
        true
    }

    async fn retrieve(&self, _url: &str) -> FetchResult<String> {
        Ok(self.html.clone())
    }
}
