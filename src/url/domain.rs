use crate::{UrlError, UrlResult};
use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Arguments
///
/// * `url` - The URL to extract the domain from
///
/// # Returns
///
/// * `Some(String)` - The lowercase domain/host
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use shelf_sentry::url::extract_domain;
///
/// let url = Url::parse("https://www.Kaufland.bg/offers").unwrap();
/// assert_eq!(extract_domain(&url), Some("www.kaufland.bg".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Parses a URL string and returns its domain
///
/// Only `http` and `https` URLs are accepted, since those are the only
/// requests the rate limiter and session manager ever see.
///
/// # Examples
///
/// ```
/// use shelf_sentry::url::domain_from_str;
///
/// assert_eq!(domain_from_str("https://lidl.bg/c/promo").unwrap(), "lidl.bg");
/// assert!(domain_from_str("ftp://lidl.bg/").is_err());
/// ```
pub fn domain_from_str(url: &str) -> UrlResult<String> {
    let parsed = Url::parse(url).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            parsed.scheme()
        )));
    }

    extract_domain(&parsed).ok_or(UrlError::MissingDomain)
}

/// Turns a domain (or any key) into a string that is safe to use in a file name
///
/// Dots and colons become underscores, as does anything that is not an ASCII
/// alphanumeric, `-` or `_`. The result never contains a path separator.
///
/// # Examples
///
/// ```
/// use shelf_sentry::url::sanitize_domain;
///
/// assert_eq!(sanitize_domain("ssbbilla.site"), "ssbbilla_site");
/// assert_eq!(sanitize_domain("127.0.0.1:8080"), "127_0_0_1_8080");
/// ```
pub fn sanitize_domain(domain: &str) -> String {
    domain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
