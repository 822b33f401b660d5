//! HTML parsing for entry pages and index pages
//!
//! This module handles:
//! - Turning an entry page into `ResultRecord`s (`EntryPageParser`)
//! - Extracting links from index pages for seed discovery
//!
//! Both are pure functions of the page text; nothing here touches the network
//! or the database.

use crate::config::ParserConfig;
use crate::crawler::traits::{ParseError, Parser};
use crate::storage::ResultRecord;
use crate::url::is_url_key;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use url::Url;

/// Extracts dictionary entries from a fetched page
///
/// Every element matching the content selector with non-blank text becomes
/// one record. The record key is the page's entry id: the `doc` query
/// parameter for URL keys, the key itself otherwise. A page yielding several
/// records suffixes them `#1`, `#2`, ...
pub struct EntryPageParser {
    content: Selector,
    headword: Selector,
    language: String,
    source_tag: String,
}

impl EntryPageParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ParseError> {
        Ok(Self {
            content: parse_selector(&config.content_selector)?,
            headword: parse_selector(&config.headword_selector)?,
            language: config.language.clone(),
            source_tag: config.source_tag.clone(),
        })
    }

    fn headwords(&self, element: &ElementRef<'_>) -> Vec<String> {
        let mut headwords: Vec<String> = Vec::new();
        for anchor in element.select(&self.headword) {
            let text = collapse_whitespace(&anchor.text().collect::<String>());
            let word = if text.is_empty() {
                anchor.value().attr("name").unwrap_or_default().trim().to_string()
            } else {
                text
            };
            if !word.is_empty() && !headwords.contains(&word) {
                headwords.push(word);
            }
        }
        headwords
    }
}

impl Parser for EntryPageParser {
    fn parse(&self, raw: &str, key: &str) -> Result<Vec<ResultRecord>, ParseError> {
        let document = Html::parse_document(raw);
        let url = is_url_key(key).then_some(key);

        let payloads: Vec<serde_json::Value> = document
            .select(&self.content)
            .filter_map(|element| {
                let text = collapse_whitespace(&element.text().collect::<String>());
                if text.is_empty() {
                    return None;
                }
                Some(json!({
                    "language": self.language,
                    "url": url,
                    "headwords": self.headwords(&element),
                    "text": text,
                    "html": element.html(),
                }))
            })
            .collect();

        let base = entry_id(key);
        let many = payloads.len() > 1;
        let records = payloads
            .into_iter()
            .enumerate()
            .map(|(index, payload)| {
                let record_key = if many {
                    format!("{}#{}", base, index + 1)
                } else {
                    base.clone()
                };
                ResultRecord::new(record_key, self.source_tag.clone(), payload)
            })
            .collect();

        Ok(records)
    }
}

/// Stable entry id for a key
///
/// Entry URLs carry their id in the `doc` query parameter; lemma keys are
/// already ids.
pub fn entry_id(key: &str) -> String {
    if !is_url_key(key) {
        return key.to_string();
    }

    Url::parse(key)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(name, _)| name == "doc")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|doc| !doc.is_empty())
        .unwrap_or_else(|| key.to_string())
}

fn parse_selector(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector)
        .map_err(|e| ParseError::Selector(format!("'{}': {:?}", selector, e)))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts absolute links from the elements matching `selector`
///
/// Matched elements contribute their own `href`; containers contribute the
/// `href` of every anchor inside them. Duplicates are dropped, first
/// occurrence wins.
pub fn extract_links(html: &str, base_url: &Url, selector: &Selector) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links: Vec<String> = Vec::new();

    let anchor_selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return links,
    };

    for element in document.select(selector) {
        let hrefs: Vec<&str> = match element.value().attr("href") {
            Some(href) => vec![href],
            None => element
                .select(&anchor_selector)
                .filter_map(|a| a.value().attr("href"))
                .collect(),
        };

        for href in hrefs {
            if let Some(absolute_url) = resolve_link(href, base_url) {
                if !links.contains(&absolute_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    // Same page anchors
    if href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}
