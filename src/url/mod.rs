//! URL handling module for Catalog-Harvest
//!
//! Detail references scraped from listing pages come in relative, root-relative
//! and absolute forms. They are normalized to one absolute form before
//! de-duplication so that the same record is never fetched twice from a page.

mod normalize;

pub use normalize::normalize_detail_ref;

use ::url::Url;

/// Returns true if an href points at a detail page
///
/// A detail page is identified by a fixed marker in its path (for the school
/// catalog this is `DetalhesEscola`).
pub fn is_detail_ref(href: &str, marker: &str) -> bool {
    !marker.is_empty() && href.contains(marker)
}

/// Normalizes and de-duplicates a list of hrefs, preserving first-seen order
///
/// Hrefs that do not carry the detail marker or that fail to normalize are
/// dropped and logged at debug level.
pub fn collect_detail_refs<'a, I>(root: &Url, marker: &str, hrefs: I) -> Vec<Url>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut refs = Vec::new();

    for href in hrefs {
        if !is_detail_ref(href, marker) {
            continue;
        }
        match normalize_detail_ref(root, href) {
            Ok(url) => {
                if seen.insert(url.as_str().to_string()) {
                    refs.push(url);
                }
            }
            Err(e) => tracing::debug!("Skipping detail href {}: {}", href, e),
        }
    }

    refs
}
