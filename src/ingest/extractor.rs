//! Listing extraction from page markup
//!
//! Candidates are found with a primary selector; when nothing matches, the
//! direct child elements of a listing container are used instead. Each
//! candidate must yield all five fields or it is dropped.

use crate::model::Listing;
use crate::IngestError;
use scraper::{ElementRef, Html, Selector};

/// Length of the text excerpt logged for a skipped candidate
const SKIP_EXCERPT_CHARS: usize = 100;

/// Named selectors that locate listings and their fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSchema {
    /// Selector for listing containers
    pub primary: String,

    /// Fallback: container whose direct children are the listings
    pub container: String,

    /// Fallback: tag name of the container's listing children
    pub child_tag: String,

    pub title: String,
    pub price: String,
    pub location: String,

    /// Element carrying the posting link
    pub link: String,

    /// Attribute of `link` holding the URL
    pub link_attr: String,

    pub date_posted: String,
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        Self {
            primary: "div.property".to_string(),
            container: "div.property-listing".to_string(),
            child_tag: "div".to_string(),
            title: "h2.title".to_string(),
            price: "p.price".to_string(),
            location: "p.location".to_string(),
            link: "a.url".to_string(),
            link_attr: "href".to_string(),
            date_posted: "span.date-posted".to_string(),
        }
    }
}

/// Outcome of extracting one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Complete listings in document order
    pub listings: Vec<Listing>,

    /// Number of candidate containers examined
    pub candidates: usize,

    /// Candidates dropped for a missing or empty field
    pub skipped: usize,

    /// Whether candidates came from the container fallback
    pub used_fallback: bool,
}

struct CompiledSchema {
    primary: Selector,
    container: Selector,
    child_tag: String,
    title: Selector,
    price: Selector,
    location: Selector,
    link: Selector,
    link_attr: String,
    date_posted: Selector,
}

/// Turns listing page markup into [`Listing`] records
pub struct ListingExtractor {
    schema: ExtractionSchema,
    compiled: CompiledSchema,
    source: String,
}

impl ListingExtractor {
    /// Compiles the schema's selectors
    ///
    /// # Arguments
    ///
    /// * `schema` - Selectors for containers and fields
    /// * `source` - Provenance tag stamped on every listing
    ///
    /// # Returns
    ///
    /// * `Ok(ListingExtractor)` - All selectors parsed
    /// * `Err(IngestError::Selector)` - A selector is invalid
    pub fn new(schema: ExtractionSchema, source: impl Into<String>) -> Result<Self, IngestError> {
        let compiled = CompiledSchema {
            primary: compile(&schema.primary)?,
            container: compile(&schema.container)?,
            child_tag: schema.child_tag.to_ascii_lowercase(),
            title: compile(&schema.title)?,
            price: compile(&schema.price)?,
            location: compile(&schema.location)?,
            link: compile(&schema.link)?,
            link_attr: schema.link_attr.clone(),
            date_posted: compile(&schema.date_posted)?,
        };

        Ok(Self {
            schema,
            compiled,
            source: source.into(),
        })
    }

    /// Builds an extractor with the default schema
    pub fn with_source(source: impl Into<String>) -> Result<Self, IngestError> {
        Self::new(ExtractionSchema::default(), source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Extracts every complete listing from `html`
    pub fn extract(&self, html: &str) -> Vec<Listing> {
        self.extract_report(html).listings
    }

    /// Extracts listings and reports how many candidates were examined and skipped
    ///
    /// Malformed markup never fails; it yields fewer or zero listings.
    pub fn extract_report(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);

        let (candidates, used_fallback) = self.candidates(&document);
        if used_fallback {
            tracing::debug!(
                "No '{}' elements found, using children of '{}'",
                self.schema.primary,
                self.schema.container
            );
        }

        let mut extraction = Extraction {
            candidates: candidates.len(),
            used_fallback,
            ..Extraction::default()
        };

        for candidate in candidates {
            match self.listing_from(candidate) {
                Some(listing) => extraction.listings.push(listing),
                None => {
                    extraction.skipped += 1;
                    tracing::debug!(
                        "Skipping an element due to missing fields: {}",
                        excerpt(candidate)
                    );
                }
            }
        }

        extraction
    }

    fn candidates<'a>(&self, document: &'a Html) -> (Vec<ElementRef<'a>>, bool) {
        let primary: Vec<_> = document.select(&self.compiled.primary).collect();
        if !primary.is_empty() {
            return (primary, false);
        }

        let children = document
            .select(&self.compiled.container)
            .next()
            .map(|container| {
                container
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|child| child.value().name() == self.compiled.child_tag)
                    .collect()
            })
            .unwrap_or_default();

        (children, true)
    }

    fn listing_from(&self, candidate: ElementRef<'_>) -> Option<Listing> {
        let schema = &self.compiled;

        let title = field_text(candidate, &schema.title)?;
        let price = field_text(candidate, &schema.price)?;
        let location = field_text(candidate, &schema.location)?;
        let url = candidate
            .select(&schema.link)
            .next()?
            .value()
            .attr(&schema.link_attr)?
            .trim()
            .to_string();
        let date_posted = field_text(candidate, &schema.date_posted)?;

        Listing::new(title, price, location, url, date_posted, self.source.as_str()).ok()
    }
}

fn compile(selector: &str) -> Result<Selector, IngestError> {
    Selector::parse(selector).map_err(|e| IngestError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Text of the first matching descendant with whitespace collapsed
fn field_text(candidate: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let element = candidate.select(selector).next()?;
    let text = element.text().collect::<String>();
    Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn excerpt(candidate: ElementRef<'_>) -> String {
    candidate
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
        .chars()
        .take(SKIP_EXCERPT_CHARS)
        .collect()
}
