//! Seed discovery
//!
//! Discovery runs once, before the crawl, to turn start points (Greek letters
//! or index URLs) into the initial work items. Its output goes straight to
//! `enqueue`; nothing here touches the queue itself.

use crate::crawler::parser::extract_links;
use crate::crawler::traits::{Discovery, Transport};
use crate::crawler::RateLimiter;
use crate::url::is_url_key;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use scraper::Selector;
use std::sync::Arc;
use url::Url;

/// Perseus beta-code for each capital Greek letter
const BETA_CODES: &[(char, &str)] = &[
    ('Α', "*a"),
    ('Β', "*b"),
    ('Γ', "*g"),
    ('Δ', "*d"),
    ('Ε', "*e"),
    ('Ζ', "*z"),
    ('Η', "*h"),
    ('Θ', "*q"),
    ('Ι', "*i"),
    ('Κ', "*k"),
    ('Λ', "*l"),
    ('Μ', "*m"),
    ('Ν', "*n"),
    ('Ξ', "*c"),
    ('Ο', "*o"),
    ('Π', "*p"),
    ('Ρ', "*r"),
    ('Σ', "*s"),
    ('Τ', "*t"),
    ('Υ', "*u"),
    ('Φ', "*f"),
    ('Χ', "*x"),
    ('Ψ', "*y"),
    ('Ω', "*w"),
];

/// Looks up the beta-code for a Greek letter, either case
pub fn beta_code(letter: &str) -> Option<&'static str> {
    let mut chars = letter.trim().chars();
    let first = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let upper = first.to_uppercase().next()?;
    BETA_CODES
        .iter()
        .find(|(greek, _)| *greek == upper)
        .map(|(_, code)| *code)
}

/// Maps each letter to its index page URL
///
/// The letter index pages hold the entries themselves, so the index URLs are
/// the work items.
pub struct LetterIndexDiscovery {
    index_url_template: String,
}

impl LetterIndexDiscovery {
    pub fn new(index_url_template: impl Into<String>) -> Self {
        Self {
            index_url_template: index_url_template.into(),
        }
    }

    /// The index URL for a start point
    ///
    /// URL start points are returned unchanged. Anything else must be a
    /// Greek letter.
    pub fn index_url(&self, start: &str) -> Result<String> {
        let start = start.trim();
        if is_url_key(start) {
            return Ok(start.to_string());
        }

        let code = beta_code(start)
            .ok_or_else(|| HarvestError::Discovery(format!("Unknown letter '{}'", start)))?;
        Ok(self.index_url_template.replace("{code}", code))
    }
}

#[async_trait]
impl Discovery for LetterIndexDiscovery {
    async fn seed(&self, start: &str) -> Result<Vec<String>> {
        Ok(vec![self.index_url(start)?])
    }
}

/// Fetches each index page and returns the entry links listed on it
pub struct LinkListDiscovery {
    index: LetterIndexDiscovery,
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    selector: Selector,
}

impl LinkListDiscovery {
    pub fn new(
        index: LetterIndexDiscovery,
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        link_selector: &str,
    ) -> Result<Self> {
        let selector = Selector::parse(link_selector).map_err(|e| {
            HarvestError::Discovery(format!("Invalid link selector '{}': {:?}", link_selector, e))
        })?;
        Ok(Self {
            index,
            transport,
            limiter,
            selector,
        })
    }
}

#[async_trait]
impl Discovery for LinkListDiscovery {
    async fn seed(&self, start: &str) -> Result<Vec<String>> {
        let index_url = self.index.index_url(start)?;
        let base = Url::parse(&index_url)
            .map_err(|e| HarvestError::Discovery(format!("Invalid index URL {}: {}", index_url, e)))?;

        // Index pages count against the same request budget as entries
        self.limiter.await_slot().await;
        let html = self.transport.fetch(&index_url).await?;

        let links = extract_links(&html, &base, &self.selector);
        tracing::info!("Discovered {} entries from {}", links.len(), index_url);
        Ok(links)
    }
}
