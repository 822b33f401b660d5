use crate::UrlError;
use url::Url;

/// Normalizes a work-queue key
///
/// Keys that look like URLs (they contain `://`) go through
/// [`normalize_url`]; anything else is treated as a lemma and only trimmed.
/// The result is what the queue uses as the uniqueness key, so two spellings
/// of the same page collapse to one item.
///
/// # Examples
///
/// ```
/// use lexicon_harvester::url::normalize_key;
///
/// assert_eq!(normalize_key("  λόγος ").unwrap(), "λόγος");
/// assert_eq!(
///     normalize_key("https://Example.COM/entry?q=a#top").unwrap(),
///     "https://example.com/entry?q=a"
/// );
/// ```
pub fn normalize_key(key: &str) -> Result<String, UrlError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(UrlError::EmptyKey);
    }

    if is_url_key(trimmed) {
        Ok(normalize_url(trimmed)?.into())
    } else {
        Ok(trimmed.to_string())
    }
}

/// Returns true if the key should be treated as a URL
pub fn is_url_key(key: &str) -> bool {
    key.contains("://")
}

/// Normalizes an entry URL
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require http or https
/// 3. Lowercase the host
/// 4. Remove the fragment
/// 5. Empty path becomes /
///
/// Query parameters are left exactly as given: entry ids live there.
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .map(str::to_lowercase)
        .ok_or(UrlError::MissingHost)?;
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    url.set_fragment(None);

    if url.path().is_empty() {
        url.set_path("/");
    }

    Ok(url)
}
