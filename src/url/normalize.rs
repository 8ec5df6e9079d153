use crate::UrlError;
use url::Url;

/// Normalizes a detail reference into an absolute URL
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace
/// 2. Resolve the href against the site root (relative and root-relative hrefs
///    both become absolute)
/// 3. Reject schemes other than HTTP and HTTPS
/// 4. Remove dot segments and duplicate slashes from the path
/// 5. Remove the fragment (everything after #)
///
/// The query string is kept as-is: detail pages on the catalog are keyed by it.
///
/// # Examples
///
/// ```
/// use catalog_harvest::url::normalize_detail_ref;
/// use url::Url;
///
/// let root = Url::parse("https://catalog.example.org/Home/Map").unwrap();
/// let url = normalize_detail_ref(&root, "/Home/DetalhesEscola?cod=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://catalog.example.org/Home/DetalhesEscola?cod=1");
/// ```
pub fn normalize_detail_ref(root: &Url, href: &str) -> Result<Url, UrlError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(UrlError::Parse("empty href".to_string()));
    }

    let mut url = root.join(href).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);
    url.set_fragment(None);

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and empty segments
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));
    if path.ends_with('/') {
        result.push('/');
    }
    result
}
