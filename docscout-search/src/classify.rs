//! Document-likeness scoring and access classification.
//!
//! Providers often return document links without a `.pdf` suffix
//! (download handlers, viewer pages), so the score combines signals from
//! the URL, the title, the snippet and any provider MIME hint.

use url::Url;

use crate::config::SearchConfig;
use crate::domains::{host_in_list, registrable_host};
use crate::types::{Classification, DocumentType, RawResult};

const URL_SUFFIX_WEIGHT: f64 = 0.6;
const URL_CONTAINS_WEIGHT: f64 = 0.3;
const MIME_HINT_WEIGHT: f64 = 0.6;
const TITLE_WEIGHT: f64 = 0.25;
const SNIPPET_WEIGHT: f64 = 0.15;

/// Score in `[0.0, 1.0]` for how likely `raw` is a document of `doc_type`.
pub fn document_confidence(raw: &RawResult, doc_type: DocumentType) -> f64 {
    let ext = doc_type.extension();
    let mut score = 0.0;

    match Url::parse(&raw.url) {
        Ok(parsed) if doc_type.matches_path(parsed.path()) => score += URL_SUFFIX_WEIGHT,
        _ if raw.url.to_ascii_lowercase().contains(&format!(".{ext}")) => {
            score += URL_CONTAINS_WEIGHT;
        }
        _ => {}
    }

    if raw
        .mime_hint
        .as_deref()
        .is_some_and(|m| doc_type.matches_mime(m) || m.to_ascii_lowercase().contains(ext))
    {
        score += MIME_HINT_WEIGHT;
    }

    if mentions_type(&raw.title, ext) {
        score += TITLE_WEIGHT;
    }
    if mentions_type(&raw.snippet, ext) {
        score += SNIPPET_WEIGHT;
    }

    f64::min(score, 1.0)
}

/// Classify one observation.
///
/// Premium platforms win regardless of confidence; otherwise a result is
/// `free` once it clears the configured threshold.
pub fn classify(raw: &RawResult, confidence: f64, config: &SearchConfig) -> Classification {
    let Some(host) = registrable_host(&raw.url) else {
        return Classification::Unknown;
    };
    if host_in_list(&host, &config.premium_domains) {
        Classification::Premium
    } else if confidence >= config.free_confidence_threshold {
        Classification::Free
    } else {
        Classification::Unknown
    }
}

/// Whether `text` mentions the extension as a word (`[PDF]`, `manual.pdf`,
/// `PDF file`).
fn mentions_type(text: &str, ext: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;

    fn raw(url: &str, title: &str, snippet: &str) -> RawResult {
        RawResult {
            provider: Provider::Google,
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            rank: 1,
            mime_hint: None,
        }
    }

    #[test]
    fn pdf_suffix_and_title_saturate() {
        let r = raw(
            "https://example.com/manual.pdf",
            "[PDF] Pump manual",
            "Download the PDF",
        );
        let score = document_confidence(&r, DocumentType::Pdf);
        assert!(score > 0.99 && score <= 1.0);
    }

    #[test]
    fn snippet_signal_counts_without_pdf_url() {
        let r = raw(
            "https://example.com/download?id=42",
            "Pump manual",
            "PDF, 2.3 MB",
        );
        let score = document_confidence(&r, DocumentType::Pdf);
        assert!((score - SNIPPET_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn pdf_in_query_string_is_weaker_than_suffix() {
        let r = raw("https://example.com/get.php?file=manual.pdf", "Manual", "");
        let score = document_confidence(&r, DocumentType::Pdf);
        assert!((score - URL_CONTAINS_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn mime_hint_is_used() {
        let mut r = raw("https://example.com/file/123", "Manual", "");
        r.mime_hint = Some("application/pdf".into());
        let score = document_confidence(&r, DocumentType::Pdf);
        assert!((score - MIME_HINT_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn unrelated_page_scores_zero() {
        let r = raw("https://example.com/products", "Pumps for sale", "Best prices");
        assert_eq!(document_confidence(&r, DocumentType::Pdf), 0.0);
    }

    #[test]
    fn word_match_does_not_hit_substrings() {
        assert!(!mentions_type("pdfcreator download", "pdf"));
        assert!(mentions_type("manual.PDF", "pdf"));
    }

    #[test]
    fn premium_domain_classified_premium_even_at_low_confidence() {
        let config = SearchConfig::default();
        let r = raw("https://www.scribd.com/document/1/pump", "Pump", "");
        assert_eq!(classify(&r, 0.0, &config), Classification::Premium);
    }

    #[test]
    fn threshold_separates_free_and_unknown() {
        let config = SearchConfig::default();
        let r = raw("https://example.com/a.pdf", "A", "");
        assert_eq!(classify(&r, 0.6, &config), Classification::Free);
        assert_eq!(classify(&r, 0.3, &config), Classification::Unknown);
    }

    #[test]
    fn unparseable_url_is_unknown() {
        let config = SearchConfig::default();
        let r = raw("not a url", "A", "");
        assert_eq!(classify(&r, 1.0, &config), Classification::Unknown);
    }
}
