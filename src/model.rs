//! Listing record definition
//!
//! A [`Listing`] is the unit of output: one real-estate ad extracted from a
//! page. It can only be built through [`Listing::new`], which refuses empty
//! fields, so an incomplete record can never reach the queue.

use serde::Serialize;
use thiserror::Error;

/// Errors raised when constructing a listing
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("Listing field '{0}' is empty")]
    EmptyField(&'static str),
}

/// One extracted real-estate listing
///
/// Field declaration order is the wire order of the JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    title: String,
    price: String,
    location: String,
    url: String,
    date_posted: String,
    source: String,
}

impl Listing {
    /// Creates a listing, rejecting any empty or whitespace-only field
    ///
    /// Values are stored as given (callers normalize before constructing).
    pub fn new(
        title: impl Into<String>,
        price: impl Into<String>,
        location: impl Into<String>,
        url: impl Into<String>,
        date_posted: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, ListingError> {
        let listing = Self {
            title: title.into(),
            price: price.into(),
            location: location.into(),
            url: url.into(),
            date_posted: date_posted.into(),
            source: source.into(),
        };

        for (name, value) in listing.fields() {
            if value.trim().is_empty() {
                return Err(ListingError::EmptyField(name));
            }
        }

        Ok(listing)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn price(&self) -> &str {
        &self.price
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn date_posted(&self) -> &str {
        &self.date_posted
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns every field with its wire name, in wire order
    pub fn fields(&self) -> [(&'static str, &str); 6] {
        [
            ("title", self.title.as_str()),
            ("price", self.price.as_str()),
            ("location", self.location.as_str()),
            ("url", self.url.as_str()),
            ("date_posted", self.date_posted.as_str()),
            ("source", self.source.as_str()),
        ]
    }

    /// Serializes the listing into its canonical JSON payload
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
