//! Premium and excluded domain lists.
//!
//! Premium domains are document-sharing platforms whose documents sit
//! behind an account or paywall. Excluded domains are marketplaces and
//! social sites that never host the documents themselves.
//!
//! Patterns are either a plain domain (`scribd.com`, matching the domain
//! and its subdomains) or a brand with a wildcard suffix (`ebay.*`,
//! matching `ebay.com`, `ebay.co.uk`, `shop.ebay.de`, ...).

use url::Url;

/// Default premium (document-sharing) platforms.
pub const PREMIUM_DOMAINS: &[&str] = &[
    "scribd.com",
    "issuu.com",
    "academia.edu",
    "researchgate.net",
    "slideshare.net",
    "calameo.com",
    "yumpu.com",
    "pdfcoffee.com",
    "pdfdrive.com",
    "pdfslide.net",
    "dokumen.tips",
    "fdocuments.net",
    "vdocuments.net",
    "cupdf.com",
    "vsepdf.com",
    "manualzz.com",
    "wenku.baidu.com",
    "docin.com",
    "book118.com",
    "doc88.com",
    "360doc.com",
    "studfile.net",
    "topuch.ru",
    "studopedia.ru",
    "slideshare.jp",
    "happycampus.com",
];

/// Default excluded domains: storefronts and social networks.
pub const EXCLUDED_DOMAINS: &[&str] = &[
    "ebay.*",
    "amazon.*",
    "aliexpress.com",
    "alibaba.com",
    "autoepcservice.com",
    "epcatalogs.com",
    "heavymanuals.com",
    "themanualman.com",
    "sellfy.com",
    "payhip.com",
    "pinterest.com",
    "facebook.com",
    "twitter.com",
    "youtube.com",
];

/// Lower-cased host of `url` with any leading `www.` removed.
///
/// Returns `None` when the URL cannot be parsed or has no host.
pub fn registrable_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(strip_www(&host).to_string())
}

/// Strip a single leading `www.` label.
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Whether `host` (already lower-cased) matches a domain pattern.
pub fn host_matches(host: &str, pattern: &str) -> bool {
    let host = strip_www(host);
    let pattern = pattern.trim().to_ascii_lowercase();

    if let Some(brand) = pattern.strip_suffix(".*") {
        return host
            .split('.')
            .rev()
            .skip(1)
            .any(|label| label == brand);
    }

    host == pattern || host.ends_with(&format!(".{pattern}"))
}

/// Whether `host` matches any pattern in `patterns`.
pub fn host_in_list(host: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| host_matches(host, p))
}

/// The default premium list as owned strings (for config defaults).
pub fn default_premium_domains() -> Vec<String> {
    PREMIUM_DOMAINS.iter().map(|d| (*d).to_string()).collect()
}

/// The default excluded list as owned strings (for config defaults).
pub fn default_excluded_domains() -> Vec<String> {
    EXCLUDED_DOMAINS.iter().map(|d| (*d).to_string()).collect()
}
