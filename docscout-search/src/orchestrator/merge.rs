//! Merge provider pages into one deduplicated, classified, ordered list.
//!
//! Pure computation: no I/O, no suspension. Given identical raw inputs
//! the output sequence is identical.

use std::collections::{BTreeMap, BTreeSet};

use crate::classify::{classify, document_confidence};
use crate::config::{SearchConfig, TitlePolicy};
use crate::domains::{host_in_list, registrable_host};
use crate::types::{Classification, DocumentType, MergedResult, Provider, RawResult};

use super::url_normalize::canonical_url;

struct Accumulator {
    merged: MergedResult,
    /// Priority index of the highest-priority contributing provider.
    best_priority: usize,
    /// Confidence of the observation whose title/snippet is displayed.
    shown_confidence: f64,
}

/// Merge successful provider pages.
///
/// - One [`MergedResult`] per canonical URL; contributing providers are
///   unioned.
/// - Classification only moves up the `unknown < free < premium` lattice.
/// - Title and snippet follow [`SearchConfig::title_policy`].
/// - Results on excluded domains, with unparseable URLs, or (unless
///   premium) below `min_confidence` are dropped.
/// - Ordering: contributing-provider count descending, then the priority
///   of the best contributing provider, then that provider's raw rank,
///   then canonical URL.
pub fn merge_pages(
    pages: &[(Provider, Vec<RawResult>)],
    doc_type: DocumentType,
    config: &SearchConfig,
) -> Vec<MergedResult> {
    let mut ordered: Vec<&(Provider, Vec<RawResult>)> = pages.iter().collect();
    ordered.sort_by_key(|(p, _)| config.priority_of(*p));

    let mut by_url: BTreeMap<String, Accumulator> = BTreeMap::new();

    for (provider, results) in ordered {
        let priority = config.priority_of(*provider);
        let mut results: Vec<&RawResult> = results.iter().collect();
        results.sort_by_key(|r| r.rank);

        for raw in results {
            let canonical = canonical_url(&raw.url);
            let Some(domain) = registrable_host(&canonical) else {
                continue;
            };
            if host_in_list(&domain, &config.excluded_domains) {
                continue;
            }

            let confidence = document_confidence(raw, doc_type);
            let classification = classify(raw, confidence, config);

            match by_url.get_mut(&canonical) {
                Some(acc) => absorb(acc, raw, confidence, classification, config.title_policy),
                None => {
                    let merged = MergedResult {
                        canonical_url: canonical.clone(),
                        domain,
                        title: raw.title.clone(),
                        snippet: raw.snippet.clone(),
                        providers: BTreeSet::from([*provider]),
                        classification,
                        confidence,
                        rank: raw.rank,
                    };
                    by_url.insert(
                        canonical,
                        Accumulator {
                            merged,
                            best_priority: priority,
                            shown_confidence: confidence,
                        },
                    );
                }
            }
        }
    }

    let mut kept: Vec<Accumulator> = by_url
        .into_values()
        .filter(|acc| {
            acc.merged.classification == Classification::Premium
                || acc.merged.confidence >= config.min_confidence
        })
        .collect();

    kept.sort_by(|a, b| {
        b.merged
            .providers
            .len()
            .cmp(&a.merged.providers.len())
            .then_with(|| a.best_priority.cmp(&b.best_priority))
            .then_with(|| a.merged.rank.cmp(&b.merged.rank))
            .then_with(|| a.merged.canonical_url.cmp(&b.merged.canonical_url))
    });

    kept.into_iter().map(|acc| acc.merged).collect()
}

/// Fold a later observation of the same canonical URL into `acc`.
///
/// Observations arrive in priority order, so the first one seen already
/// carries the best priority and rank.
fn absorb(
    acc: &mut Accumulator,
    raw: &RawResult,
    confidence: f64,
    classification: Classification,
    policy: TitlePolicy,
) {
    let merged = &mut acc.merged;
    merged.providers.insert(raw.provider);
    merged.classification = merged.classification.join(classification);
    merged.confidence = merged.confidence.max(confidence);

    let replace = match policy {
        TitlePolicy::HighestConfidence => confidence > acc.shown_confidence,
        TitlePolicy::FirstByPriority => false,
        TitlePolicy::LongestSnippet => raw.snippet.len() > merged.snippet.len(),
    } || (merged.title.is_empty() && !raw.title.is_empty());

    if replace {
        merged.title = raw.title.clone();
        merged.snippet = raw.snippet.clone();
        acc.shown_confidence = confidence;
    }
}
