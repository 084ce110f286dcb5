use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Arguments
///
/// * `url` - The URL to extract the host from
///
/// # Returns
///
/// * `Some(String)` - The lowercase host
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use wayfinder::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the host plus any non-default port
///
/// Politeness limits and same-host scoping are keyed by this value, so two
/// servers on one machine but different ports are treated as different hosts.
pub fn host_with_port(url: &Url) -> Option<String> {
    let host = extract_host(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Returns `scheme://host[:port]` for a URL
pub fn origin_of(url: &Url) -> Option<String> {
    let authority = host_with_port(url)?;
    Some(format!("{}://{}", url.scheme(), authority))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_host() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_subdomain() {
        let url = Url::parse("https://blog.example.com/post").unwrap();
        assert_eq!(extract_host(&url), Some("blog.example.com".to_string()));
    }

    #[test]
    fn test_extract_ignores_port() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_host_with_port() {
        let url = Url::parse("http://127.0.0.1:4321/a").unwrap();
        assert_eq!(host_with_port(&url), Some("127.0.0.1:4321".to_string()));

        let url = Url::parse("https://Example.com:443/a").unwrap();
        assert_eq!(host_with_port(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_origin_of() {
        let url = Url::parse("http://127.0.0.1:4321/deep/page?x=1").unwrap();
        assert_eq!(origin_of(&url), Some("http://127.0.0.1:4321".to_string()));

        let url = Url::parse("https://example.com/a").unwrap();
        assert_eq!(origin_of(&url), Some("https://example.com".to_string()));
    }
}
