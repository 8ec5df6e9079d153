//! Listing page parser
//!
//! This module handles parsing a rendered listing page to extract:
//! - Detail references (absolute, de-duplicated, first-seen order)
//! - The total page count from the numbered pagination buttons
//! - The total item count from the "... de N registros" summary line

use crate::config::SiteConfig;
use crate::url::collect_detail_refs;
use crate::ConfigError;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Matches the item total in "Mostrando de 1 até 100 de 5.574 registros"
const TOTAL_ITEMS_PATTERN: &str = r"de (\d+(?:\.\d+)*) registros";

/// Everything one listing page yields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub detail_refs: Vec<Url>,
    pub total_pages: u32,
    pub total_items: u64,
}

/// Parser for listing pages, built once per run from the site layout
#[derive(Debug)]
pub struct ListingParser {
    root: Url,
    marker: String,
    link_selectors: Vec<Selector>,
    pagination_button: Selector,
    info: Selector,
    total_items: Regex,
}

fn compile(css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", css, e)))
}

impl ListingParser {
    pub fn new(site: &SiteConfig) -> Result<Self, ConfigError> {
        let root = Url::parse(&site.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", site.base_url, e)))?;

        let link_selectors = site
            .link_selectors
            .iter()
            .map(|css| compile(css))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root,
            marker: site.detail_marker.clone(),
            link_selectors,
            pagination_button: compile(&site.pagination_button)?,
            info: compile(&site.info_selector)?,
            total_items: Regex::new(TOTAL_ITEMS_PATTERN)
                .map_err(|e| ConfigError::Validation(e.to_string()))?,
        })
    }

    /// Parses detail references and both totals from one document
    pub fn parse(&self, html: &str) -> ListingPage {
        let document = Html::parse_document(html);
        ListingPage {
            detail_refs: self.detail_refs_in(&document),
            total_pages: self.total_pages_in(&document),
            total_items: self.total_items_in(&document),
        }
    }

    /// Detail references on the page
    ///
    /// Link selectors are tried in order; the first one that matches anything
    /// wins.
    pub fn detail_refs(&self, html: &str) -> Vec<Url> {
        self.detail_refs_in(&Html::parse_document(html))
    }

    /// Largest numeric pagination button, 1 when there is none
    pub fn total_pages(&self, html: &str) -> u32 {
        self.total_pages_in(&Html::parse_document(html))
    }

    /// Item total from the summary line, 0 when absent
    pub fn total_items(&self, html: &str) -> u64 {
        self.total_items_in(&Html::parse_document(html))
    }

    /// Item total from raw summary text, thousands separators removed
    pub fn parse_total_items_text(&self, text: &str) -> Option<u64> {
        self.total_items
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().replace('.', "").parse().ok())
    }

    fn detail_refs_in(&self, document: &Html) -> Vec<Url> {
        for selector in &self.link_selectors {
            let hrefs: Vec<&str> = document
                .select(selector)
                .filter_map(|a| a.value().attr("href"))
                .collect();
            if hrefs.is_empty() {
                continue;
            }

            let refs = collect_detail_refs(&self.root, &self.marker, hrefs.iter().copied());
            tracing::debug!(
                total_links = hrefs.len(),
                unique_refs = refs.len(),
                "Extracted detail references"
            );
            return refs;
        }

        tracing::debug!("No listing links matched any selector");
        Vec::new()
    }

    fn total_pages_in(&self, document: &Html) -> u32 {
        document
            .select(&self.pagination_button)
            .filter_map(|button| {
                button
                    .text()
                    .collect::<String>()
                    .trim()
                    .parse::<u32>()
                    .ok()
            })
            .max()
            .unwrap_or(1)
            .max(1)
    }

    fn total_items_in(&self, document: &Html) -> u64 {
        document
            .select(&self.info)
            .next()
            .map(|el| el.text().collect::<String>())
            .and_then(|text| self.parse_total_items_text(&text))
            .unwrap_or(0)
    }
}
