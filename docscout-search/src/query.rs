//! Query planning: one provider-specific query string per target provider.
//!
//! The planner strips every qualifier equivalent to the requested document
//! type (in any provider dialect) and appends the target provider's own
//! qualifier exactly once. Planning an already-planned query therefore
//! yields the same string.

use crate::error::SearchError;
use crate::types::{DocumentType, Provider};

/// Qualifier prefixes recognised as filetype filters, across dialects.
const QUALIFIER_PREFIXES: &[&str] = &["filetype:", "mime:", "ext:"];

/// Collapse whitespace and strip document-type qualifiers.
///
/// # Errors
///
/// Returns [`SearchError::InvalidRequest`] if nothing remains.
pub fn normalize_query(query: &str, doc_type: DocumentType) -> Result<String, SearchError> {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(tokens.len());

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        match qualifier_value(token) {
            // `filetype:pdf`
            Some(value) if !value.is_empty() => {
                if !is_equivalent(value, doc_type) {
                    kept.push(token);
                }
                i += 1;
            }
            // `filetype: pdf`
            Some(_) => {
                match tokens.get(i + 1) {
                    Some(next) if is_equivalent(next, doc_type) => i += 2,
                    _ => {
                        kept.push(token);
                        i += 1;
                    }
                }
            }
            None => {
                kept.push(token);
                i += 1;
            }
        }
    }

    if kept.is_empty() {
        return Err(SearchError::InvalidRequest(
            "query is empty after trimming".into(),
        ));
    }
    Ok(kept.join(" "))
}

fn with_qualifier(base: &str, doc_type: DocumentType, provider: Provider) -> String {
    format!(
        "{base} {}{}",
        provider.qualifier_syntax().prefix(),
        doc_type.extension()
    )
}

/// Build one query string per provider, preserving `providers` order.
///
/// # Errors
///
/// Returns [`SearchError::InvalidRequest`] if the query is empty after
/// trimming and qualifier removal.
pub fn plan_all(
    query: &str,
    doc_type: DocumentType,
    providers: &[Provider],
) -> Result<Vec<(Provider, String)>, SearchError> {
    let base = normalize_query(query, doc_type)?;
    Ok(providers
        .iter()
        .map(|p| (*p, with_qualifier(&base, doc_type, *p)))
        .collect())
}

/// If `token` is a qualifier, return what follows the colon.
fn qualifier_value(token: &str) -> Option<&str> {
    let lower = token.to_ascii_lowercase();
    QUALIFIER_PREFIXES
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .map(|prefix| &token[prefix.len()..])
}

fn is_equivalent(value: &str, doc_type: DocumentType) -> bool {
    let value = value
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_start_matches('.');
    value.eq_ignore_ascii_case(doc_type.extension())
        || value.eq_ignore_ascii_case(doc_type.mime_type())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_query(
        query: &str,
        doc_type: DocumentType,
        provider: Provider,
    ) -> Result<String, SearchError> {
        plan_all(query, doc_type, &[provider]).map(|mut plans| plans.remove(0).1)
    }

    #[test]
    fn appends_filetype_for_google() {
        let q = plan_query("hydraulic pump manual", DocumentType::Pdf, Provider::Google)
            .expect("plan");
        assert_eq!(q, "hydraulic pump manual filetype:pdf");
    }

    #[test]
    fn appends_mime_for_yandex() {
        let q = plan_query("hydraulic pump manual", DocumentType::Pdf, Provider::Yandex)
            .expect("plan");
        assert_eq!(q, "hydraulic pump manual mime:pdf");
    }

    #[test]
    fn replanning_is_idempotent() {
        for provider in Provider::all() {
            let once = plan_query("pump  manual", DocumentType::Pdf, *provider).expect("plan");
            let twice = plan_query(&once, DocumentType::Pdf, *provider).expect("replan");
            assert_eq!(once, twice, "{provider}");
        }
    }

    #[test]
    fn existing_qualifier_is_not_duplicated() {
        let q = plan_query("pump Filetype:PDF manual", DocumentType::Pdf, Provider::Brave)
            .expect("plan");
        assert_eq!(q, "pump manual filetype:pdf");
        assert_eq!(q.matches("filetype:").count(), 1);
    }

    #[test]
    fn other_dialect_is_rewritten_for_yandex() {
        let q = plan_query("pump filetype:pdf", DocumentType::Pdf, Provider::Yandex)
            .expect("plan");
        assert_eq!(q, "pump mime:pdf");
    }

    #[test]
    fn spaced_qualifier_is_stripped() {
        let q = normalize_query("pump filetype: pdf", DocumentType::Pdf).expect("normalize");
        assert_eq!(q, "pump");
    }

    #[test]
    fn unrelated_qualifier_is_kept() {
        let q = normalize_query("pump filetype:doc", DocumentType::Pdf).expect("normalize");
        assert_eq!(q, "pump filetype:doc");
    }

    #[test]
    fn mime_type_value_counts_as_equivalent() {
        let q = normalize_query("pump mime:application/pdf", DocumentType::Pdf)
            .expect("normalize");
        assert_eq!(q, "pump");
    }

    #[test]
    fn empty_query_is_invalid() {
        let err = plan_query("   ", DocumentType::Pdf, Provider::Google).unwrap_err();
        assert!(matches!(err, SearchError::InvalidRequest(_)));
    }

    #[test]
    fn qualifier_only_query_is_invalid() {
        let err = plan_query("filetype:pdf", DocumentType::Pdf, Provider::Google).unwrap_err();
        assert!(matches!(err, SearchError::InvalidRequest(_)));
    }

    #[test]
    fn plan_all_preserves_order() {
        let plans = plan_all(
            "pump",
            DocumentType::Pdf,
            &[Provider::Yandex, Provider::Google],
        )
        .expect("plan");
        assert_eq!(plans[0], (Provider::Yandex, "pump mime:pdf".to_string()));
        assert_eq!(plans[1], (Provider::Google, "pump filetype:pdf".to_string()));
    }
}
