use crate::url::UrlKey;
use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during canonicalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "_ga",
    "ref",
];

/// Canonicalizes a raw URL into its URL Key
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https` (the scheme is kept as-is)
/// 3. Lowercase the host and drop the scheme's default port
/// 4. Normalize path:
///    - Remove dot segments and repeated slashes
///    - Remove trailing slash (except for root /)
/// 5. Drop the fragment unless it names an application state (`#!` or `#/`)
/// 6. Remove tracking query parameters
/// 7. Sort remaining query parameters by name, then value
/// 8. Remove empty query string (trailing ?)
///
/// The result is a fixed point: canonicalizing a key's string yields the same key.
///
/// # Examples
///
/// ```
/// use wayfinder::url::canonicalize;
///
/// let key = canonicalize("HTTPS://Shop.Example.com:443/cart/?utm_source=x&b=2&a=1#top").unwrap();
/// assert_eq!(key.as_str(), "https://shop.example.com/cart?a=1&b=2");
/// ```
pub fn canonicalize(raw: &str) -> Result<UrlKey, UrlError> {
    canonicalize_url(raw).map(|url| UrlKey::from_canonical(&url))
}

/// Same as [`canonicalize`], but hands back the canonical [`Url`] for fetching
pub fn canonicalize_url(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize_parsed(url)
}

/// Canonicalizes an already parsed URL
pub fn canonicalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => return Err(UrlError::MissingHost),
    };
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    // `Url` already omits default ports, an explicit one is left only when it differs
    if url.port().is_some() && url.port() == default_port(url.scheme()) {
        let _ = url.set_port(None);
    }

    // Credentials never identify a page
    let _ = url.set_username("");
    let _ = url.set_password(None);

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    let keep_fragment = url.fragment().map(is_app_state_fragment).unwrap_or(false);
    if !keep_fragment {
        url.set_fragment(None);
    }

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        url.set_query(None);
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Returns true if a fragment addresses a distinct client-side state
///
/// Hash-bang (`#!/cart`) and hash-routes (`#/cart`) select different views of a
/// single-page app; any other fragment is an in-page anchor.
pub fn is_app_state_fragment(fragment: &str) -> bool {
    fragment.len() > 1 && (fragment.starts_with('!') || fragment.starts_with('/'))
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.is_empty() && !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort();

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();

    if TRACKING_PARAMS.contains(&key.as_str()) {
        return true;
    }

    // Catches any utm parameter
    key.starts_with("utm_")
}
