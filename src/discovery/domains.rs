//! Domain extraction and scan-path derivation. Pure functions.

use std::collections::{BTreeMap, HashSet};

use docscout_search::domains::{host_matches, registrable_host};
use docscout_search::{DocumentType, MergedResult};
use url::Url;

use crate::store::DiscoveredDomain;

/// Distinct domains in `results`, most hits first, ties by name.
///
/// Each domain carries the directory paths its results live under, in the
/// order they were first seen.
pub fn extract_domains(results: &[MergedResult], origin_query: &str) -> Vec<DiscoveredDomain> {
    let mut by_domain: BTreeMap<String, DiscoveredDomain> = BTreeMap::new();

    for result in results {
        let Ok(url) = Url::parse(&result.canonical_url) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        let Some(domain) = registrable_host(url.as_str()) else {
            continue;
        };

        let entry = by_domain
            .entry(domain.clone())
            .or_insert_with(|| DiscoveredDomain {
                domain,
                origin_query: origin_query.to_string(),
                origin_url: result.canonical_url.clone(),
                paths: Vec::new(),
                hits: 0,
            });
        entry.hits += 1;
        if let Some(dir) = directory_of(url.path()) {
            if !entry.paths.contains(&dir) {
                entry.paths.push(dir);
            }
        }
    }

    let mut domains: Vec<DiscoveredDomain> = by_domain.into_values().collect();
    domains.sort_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.domain.cmp(&b.domain)));
    domains
}

/// Directory part of a url path with both slashes, or `None` at the root.
fn directory_of(path: &str) -> Option<String> {
    let (dir, _file) = path.rsplit_once('/')?;
    let trimmed = dir.trim_matches('/');
    (!trimmed.is_empty()).then(|| format!("/{trimmed}/"))
}

/// Paths to map for a domain: every ancestor level of every seen path,
/// deepest first, then the root, capped at `max_sources`. The root is
/// always mapped; the cap trims directory levels only.
///
/// `/upload/user55/docs/` yields `/upload/user55/docs/`, `/upload/user55/`,
/// `/upload/`, then `/`.
pub fn scan_paths(domain: &DiscoveredDomain, max_sources: usize) -> Vec<String> {
    let mut levels: Vec<String> = Vec::new();
    for path in &domain.paths {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        for depth in (1..=parts.len()).rev() {
            let level = format!("/{}/", parts[..depth].join("/"));
            if !levels.contains(&level) {
                levels.push(level);
            }
        }
    }
    levels.sort_by(|a, b| {
        depth(b)
            .cmp(&depth(a))
            .then_with(|| a.cmp(b))
    });
    levels.truncate(max_sources.saturating_sub(1));
    levels.push("/".to_string());
    levels
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}

/// Key used to deduplicate candidate urls: lower-cased, no query or fragment.
pub fn candidate_key(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase()
}

/// Keep mapped links on `domain` (or its subdomains) whose path carries
/// the document extension, skipping any key already in `seen`.
pub fn filter_candidates(
    links: &[String],
    domain: &str,
    doc_type: DocumentType,
    seen: &mut HashSet<String>,
) -> Vec<String> {
    let mut out = Vec::new();
    for link in links {
        let Ok(url) = Url::parse(link) else {
            continue;
        };
        let Some(host) = registrable_host(url.as_str()) else {
            continue;
        };
        if !host_matches(&host, domain) {
            continue;
        }
        if !doc_type.matches_path(url.path()) {
            continue;
        }
        if seen.insert(candidate_key(link)) {
            out.push(link.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use docscout_search::Classification;
    use std::collections::BTreeSet;

    fn merged(url: &str) -> MergedResult {
        MergedResult {
            canonical_url: url.into(),
            domain: registrable_host(url).unwrap_or_default(),
            title: String::new(),
            snippet: String::new(),
            providers: BTreeSet::new(),
            classification: Classification::Free,
            confidence: 0.9,
            rank: 1,
        }
    }

    #[test]
    fn extracts_distinct_domains_by_hits() {
        let results = vec![
            merged("https://b.example/docs/1.pdf"),
            merged("https://a.example/x/1.pdf"),
            merged("https://b.example/docs/2.pdf"),
            merged("https://b.example/manuals/3.pdf"),
            merged("https://c.example/1.pdf"),
        ];
        let domains = extract_domains(&results, "pump");
        let names: Vec<&str> = domains.iter().map(|d| d.domain.as_str()).collect();
        assert_eq!(names, vec!["b.example", "a.example", "c.example"]);
        assert_eq!(domains[0].hits, 3);
        assert_eq!(domains[0].paths, vec!["/docs/", "/manuals/"]);
        assert_eq!(domains[0].origin_url, "https://b.example/docs/1.pdf");
        assert!(domains[2].paths.is_empty());
        assert!(domains.iter().all(|d| d.origin_query == "pump"));
    }

    #[test]
    fn ignores_non_http_urls() {
        let results = vec![merged("ftp://files.example/a.pdf"), merged("not a url")];
        assert!(extract_domains(&results, "q").is_empty());
    }

    #[test]
    fn scan_paths_go_deepest_first_then_root() {
        let domain = DiscoveredDomain {
            domain: "example.com".into(),
            origin_query: "q".into(),
            origin_url: "https://example.com/upload/user55/docs/a.pdf".into(),
            paths: vec!["/upload/user55/docs/".into(), "/catalog/".into()],
            hits: 2,
        };
        assert_eq!(
            scan_paths(&domain, 10),
            vec![
                "/upload/user55/docs/",
                "/upload/user55/",
                "/catalog/",
                "/upload/",
                "/",
            ]
        );
        assert_eq!(scan_paths(&domain, 2), vec!["/upload/user55/docs/", "/"]);
    }

    #[test]
    fn capped_deep_paths_still_map_the_root() {
        let domain = DiscoveredDomain {
            domain: "example.com".into(),
            origin_query: "q".into(),
            origin_url: "https://example.com/upload/user55/docs/a.pdf".into(),
            paths: vec!["/upload/user55/docs/".into()],
            hits: 1,
        };
        assert_eq!(
            scan_paths(&domain, 3),
            vec!["/upload/user55/docs/", "/upload/user55/", "/"]
        );
        assert_eq!(scan_paths(&domain, 1), vec!["/"]);
    }

    #[test]
    fn scan_paths_for_root_only_domain() {
        let domain = DiscoveredDomain {
            domain: "example.com".into(),
            origin_query: "q".into(),
            origin_url: "https://example.com/a.pdf".into(),
            paths: vec![],
            hits: 1,
        };
        assert_eq!(scan_paths(&domain, 3), vec!["/"]);
    }

    #[test]
    fn candidates_filtered_by_extension_host_and_seen() {
        let links: Vec<String> = [
            "https://example.com/docs/a.pdf",
            "https://example.com/docs/A.PDF?dl=1",
            "https://cdn.example.com/b.pdf",
            "https://other.org/c.pdf",
            "https://example.com/docs/index.html",
            "https://example.com/docs/sheet.xlsx",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let mut seen = HashSet::new();
        let kept = filter_candidates(&links, "example.com", DocumentType::Pdf, &mut seen);
        assert_eq!(
            kept,
            vec!["https://example.com/docs/a.pdf", "https://cdn.example.com/b.pdf"]
        );
        let again = filter_candidates(&links, "example.com", DocumentType::Pdf, &mut seen);
        assert!(again.is_empty());
    }
}
