//! URL normalization for cache identity.
//!
//! Two requests for the same resource must produce the same key, so every
//! URL the worker sees goes through here first.

use url::Url;

/// Error type for URL normalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Normalize an absolute URL.
///
/// Trims whitespace, rejects non-HTTP schemes, lowercases the host and drops
/// the fragment. The query string is kept byte for byte: Content API queries
/// differ only there.
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(&mut parsed)?;
    Ok(parsed)
}

/// Resolve a request target against the kiosk origin.
///
/// Absolute URLs (`https://cdn.sanity.io/...`) are normalized as they are;
/// origin-relative paths (`/offline.html`) are joined onto `origin`.
pub fn resolve(origin: &Url, target: &str) -> Result<Url, UrlError> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }
    if trimmed.contains("://") {
        return canonicalize(trimmed);
    }

    let mut joined = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(&mut joined)?;
    Ok(joined)
}

fn normalize(url: &mut Url) -> Result<(), UrlError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = url.host_str().map(str::to_lowercase) {
        url.set_host(Some(&host)).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }
    url.set_fragment(None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("http://127.0.0.1:4321").unwrap()
    }

    #[test]
    fn test_canonicalize_drops_fragment_keeps_query() {
        let url = canonicalize(" https://832K5JE1.api.sanity.io/v2024-01-01/data/query/production?query=*&$id=%22a%22#x ")
            .unwrap();
        assert_eq!(url.host_str(), Some("832k5je1.api.sanity.io"));
        assert_eq!(url.query(), Some("query=*&$id=%22a%22"));
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_canonicalize_rejects_other_schemes() {
        assert!(matches!(canonicalize("file:///etc/hosts"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(canonicalize("ws://kiosk.local/socket"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_requires_absolute() {
        assert!(matches!(canonicalize("/offline.html"), Err(UrlError::InvalidUrl(_))));
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_resolve_origin_relative() {
        assert_eq!(resolve(&origin(), "/").unwrap().as_str(), "http://127.0.0.1:4321/");
        assert_eq!(
            resolve(&origin(), "/exponate/abc?lang=de#top").unwrap().as_str(),
            "http://127.0.0.1:4321/exponate/abc?lang=de"
        );
    }

    #[test]
    fn test_resolve_absolute_ignores_origin() {
        let url = resolve(&origin(), "https://CDN.sanity.io/images/832k5je1/production/a.jpg").unwrap();
        assert_eq!(url.as_str(), "https://cdn.sanity.io/images/832k5je1/production/a.jpg");
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve(&origin(), ""), Err(UrlError::Empty)));
    }
}
