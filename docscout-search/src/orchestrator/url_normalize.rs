//! Canonical URLs for cross-provider deduplication.
//!
//! Two provider results refer to the same document when their canonical
//! URLs are equal. Canonicalisation lower-cases the host, drops `www.`,
//! default ports, credentials, fragments and tracking parameters, sorts
//! the remaining query parameters and removes any trailing slash.

use url::Url;

/// Tracking query parameters that are stripped during canonicalisation.
/// Any key starting with `utm_` is stripped as well.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "gclsrc", "dclid", "msclkid", "yclid", "mc_cid", "mc_eid", "_ga", "ref",
    "si", "feature",
];

/// Canonicalise a URL for use as a dedup key.
///
/// If the input cannot be parsed as an absolute URL with a host, the
/// trimmed input is returned unchanged.
///
/// # Examples
///
/// ```
/// use docscout_search::orchestrator::url_normalize::canonical_url;
///
/// let a = canonical_url("https://WWW.Example.COM/docs/?b=2&a=1&utm_source=x#p3");
/// let b = canonical_url("https://example.com/docs?a=1&b=2");
/// assert_eq!(a, b);
/// assert_eq!(b, "https://example.com/docs?a=1&b=2");
/// ```
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return trimmed.to_string();
    };

    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut out = format!("{}://{host}", parsed.scheme());
    if let Some(port) = parsed.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }

    let path = parsed.path().trim_end_matches('/');
    out.push_str(path);

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    if !params.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        out.push('?');
        out.push_str(&query);
    }

    out
}

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_host_preserves_path_case() {
        assert_eq!(
            canonical_url("HTTPS://Example.COM/Docs/Pump.PDF"),
            "https://example.com/Docs/Pump.PDF"
        );
    }

    #[test]
    fn strips_www() {
        assert_eq!(
            canonical_url("https://www.example.com/a.pdf"),
            "https://example.com/a.pdf"
        );
    }

    #[test]
    fn removes_trailing_slash_including_root() {
        assert_eq!(canonical_url("https://example.com/docs/"), "https://example.com/docs");
        assert_eq!(canonical_url("https://example.com/"), "https://example.com");
        assert_eq!(canonical_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn removes_default_ports_keeps_others() {
        assert_eq!(canonical_url("http://example.com:80/a"), "http://example.com/a");
        assert_eq!(canonical_url("https://example.com:443/a"), "https://example.com/a");
        assert_eq!(
            canonical_url("https://example.com:8443/a"),
            "https://example.com:8443/a"
        );
    }

    #[test]
    fn strips_tracking_params_case_insensitively() {
        assert_eq!(
            canonical_url("https://example.com/a.pdf?id=7&UTM_Source=x&utm_medium=y&fbclid=z"),
            "https://example.com/a.pdf?id=7"
        );
    }

    #[test]
    fn sorts_remaining_params() {
        assert_eq!(
            canonical_url("https://example.com/get?z=1&a=2&m=3"),
            "https://example.com/get?a=2&m=3&z=1"
        );
    }

    #[test]
    fn reencodes_reserved_characters_in_values() {
        let out = canonical_url("https://example.com/get?file=a%26b.pdf");
        assert_eq!(out, "https://example.com/get?file=a%26b.pdf");
    }

    #[test]
    fn removes_fragment_and_credentials() {
        assert_eq!(
            canonical_url("https://user:pw@example.com/a.pdf#page=3"),
            "https://example.com/a.pdf"
        );
    }

    #[test]
    fn canonicalisation_is_idempotent() {
        let once = canonical_url("https://WWW.example.com/a/?b=1&utm_term=x");
        assert_eq!(canonical_url(&once), once);
    }

    #[test]
    fn invalid_url_returned_trimmed() {
        assert_eq!(canonical_url("  not a url "), "not a url");
        assert_eq!(canonical_url(""), "");
    }
}
