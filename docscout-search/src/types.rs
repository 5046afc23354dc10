//! Core types for document search requests, provider results and merged output.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::SearchError;

/// Search providers that docscout can query.
///
/// Declaration order is also the default priority order used when a
/// configuration does not list providers explicitly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google results through the Serper API.
    Google,
    /// Brave Search API, an independent index.
    Brave,
    /// Yandex Cloud Search API, strong coverage of Cyrillic sources.
    Yandex,
    /// DuckDuckGo HTML endpoint, keyless.
    DuckDuckGo,
}

impl Provider {
    /// Stable lower-case identifier, used in config files and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Brave => "brave",
            Self::Yandex => "yandex",
            Self::DuckDuckGo => "duckduckgo",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Google => "Google (Serper)",
            Self::Brave => "Brave",
            Self::Yandex => "Yandex",
            Self::DuckDuckGo => "DuckDuckGo",
        }
    }

    /// Which filetype qualifier dialect this provider understands.
    pub fn qualifier_syntax(&self) -> QualifierSyntax {
        match self {
            Self::Yandex => QualifierSyntax::Mime,
            Self::Google | Self::Brave | Self::DuckDuckGo => QualifierSyntax::Filetype,
        }
    }

    /// Returns all provider variants in default priority order.
    pub fn all() -> &'static [Provider] {
        &[Self::Google, Self::Brave, Self::Yandex, Self::DuckDuckGo]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "serper" => Ok(Self::Google),
            "brave" => Ok(Self::Brave),
            "yandex" => Ok(Self::Yandex),
            "duckduckgo" | "ddg" => Ok(Self::DuckDuckGo),
            other => Err(SearchError::InvalidRequest(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// Query qualifier dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualifierSyntax {
    /// `filetype:pdf`
    Filetype,
    /// `mime:pdf`
    Mime,
}

impl QualifierSyntax {
    /// The qualifier prefix including the colon.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Filetype => "filetype:",
            Self::Mime => "mime:",
        }
    }
}

/// Document types that can be searched for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    #[default]
    Pdf,
    Doc,
    Docx,
    Xls,
    Xlsx,
    Ppt,
    Pptx,
}

impl DocumentType {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Xls => "xls",
            Self::Xlsx => "xlsx",
            Self::Ppt => "ppt",
            Self::Pptx => "pptx",
        }
    }

    /// Canonical MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Doc => "application/msword",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Xls => "application/vnd.ms-excel",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Ppt => "application/vnd.ms-powerpoint",
            Self::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }

    /// Whether a `Content-Type` (or provider mime hint) denotes this type.
    ///
    /// Accepts the canonical MIME type, parameters after `;`, and bare
    /// extension hints such as `pdf`.
    pub fn matches_mime(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence == self.mime_type() || essence == self.extension()
    }

    /// Whether a URL path ends with this type's extension (case-insensitive).
    pub fn matches_path(&self, path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        lower.ends_with(&format!(".{}", self.extension()))
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DocumentType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "doc" => Ok(Self::Doc),
            "docx" => Ok(Self::Docx),
            "xls" => Ok(Self::Xls),
            "xlsx" => Ok(Self::Xlsx),
            "ppt" => Ok(Self::Ppt),
            "pptx" => Ok(Self::Pptx),
            other => Err(SearchError::InvalidRequest(format!(
                "unsupported document type: {other}"
            ))),
        }
    }
}

/// Access classification of a result.
///
/// Ordered as a lattice: `Unknown < Free < Premium`. Merging two
/// observations keeps the larger one, so premium is never downgraded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    #[default]
    Unknown,
    Free,
    Premium,
}

impl Classification {
    /// Least upper bound of two observations.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Free => "free",
            Self::Premium => "premium",
        })
    }
}

/// Pagination position within one provider's result list.
///
/// `offset` counts results already consumed; adapters translate it to
/// their own page or offset parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cursor {
    pub offset: u32,
}

impl Cursor {
    /// The first page.
    pub fn start() -> Self {
        Self { offset: 0 }
    }

    /// Whether this cursor points at the first page.
    pub fn is_start(&self) -> bool {
        self.offset == 0
    }
}

/// A canonical document search request. Immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query as supplied by the caller.
    pub query: String,
    /// Document type filter.
    pub doc_type: DocumentType,
    /// Explicit provider allow-list. `None` means every configured provider.
    pub providers: Option<Vec<Provider>>,
    /// Per-provider cursors. Empty for a first-page request; a "load
    /// more" request carries the cursors returned by the previous page.
    pub cursors: BTreeMap<Provider, Cursor>,
}

impl SearchRequest {
    /// A first-page request across all configured providers.
    pub fn new(query: impl Into<String>, doc_type: DocumentType) -> Self {
        Self {
            query: query.into(),
            doc_type,
            providers: None,
            cursors: BTreeMap::new(),
        }
    }

    /// Restrict the request to the given providers.
    #[must_use]
    pub fn with_providers(mut self, providers: Vec<Provider>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Continue from the cursors of a previous page.
    #[must_use]
    pub fn with_cursors(mut self, cursors: BTreeMap<Provider, Cursor>) -> Self {
        self.cursors = cursors;
        self
    }

    /// A request with no cursors asks for the first page of every provider.
    pub fn is_first_page(&self) -> bool {
        self.cursors.is_empty()
    }
}

/// One result as returned by a single provider adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub provider: Provider,
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// 1-based position in the provider's overall result list.
    pub rank: u32,
    /// MIME type reported by the provider, if any (Yandex only).
    pub mime_hint: Option<String>,
}

/// A deduplicated result after merging all provider pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    /// Dedup key; see [`crate::orchestrator::url_normalize::canonical_url`].
    pub canonical_url: String,
    /// Lower-cased host without a leading `www.`.
    pub domain: String,
    pub title: String,
    pub snippet: String,
    /// Every provider that returned this document.
    pub providers: BTreeSet<Provider>,
    pub classification: Classification,
    /// Document-likeness score in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Raw rank in the highest-priority contributing provider.
    pub rank: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_are_unique() {
        let names: BTreeSet<&str> = Provider::all().iter().map(|p| p.name()).collect();
        assert_eq!(names.len(), Provider::all().len());
    }

    #[test]
    fn provider_from_str_accepts_aliases() {
        assert_eq!("serper".parse::<Provider>().ok(), Some(Provider::Google));
        assert_eq!("DDG".parse::<Provider>().ok(), Some(Provider::DuckDuckGo));
        assert!("bing".parse::<Provider>().is_err());
    }

    #[test]
    fn provider_serde_is_lowercase() {
        let json = serde_json::to_string(&Provider::DuckDuckGo).expect("serialize");
        assert_eq!(json, "\"duckduckgo\"");
        let back: Provider = serde_json::from_str("\"yandex\"").expect("deserialize");
        assert_eq!(back, Provider::Yandex);
    }

    #[test]
    fn only_yandex_uses_mime_syntax() {
        for p in Provider::all() {
            let expected = if *p == Provider::Yandex {
                QualifierSyntax::Mime
            } else {
                QualifierSyntax::Filetype
            };
            assert_eq!(p.qualifier_syntax(), expected);
        }
    }

    #[test]
    fn classification_lattice_never_downgrades() {
        assert_eq!(
            Classification::Premium.join(Classification::Free),
            Classification::Premium
        );
        assert_eq!(
            Classification::Unknown.join(Classification::Free),
            Classification::Free
        );
        assert_eq!(
            Classification::Free.join(Classification::Unknown),
            Classification::Free
        );
    }

    #[test]
    fn document_type_matches_mime_with_parameters() {
        assert!(DocumentType::Pdf.matches_mime("application/pdf; charset=binary"));
        assert!(DocumentType::Pdf.matches_mime("PDF"));
        assert!(!DocumentType::Pdf.matches_mime("text/html"));
    }

    #[test]
    fn document_type_matches_path_case_insensitive() {
        assert!(DocumentType::Pdf.matches_path("/manuals/PUMP.PDF"));
        assert!(!DocumentType::Pdf.matches_path("/manuals/pump.pdf.html"));
        assert!(DocumentType::Docx.matches_path("/a/b.docx"));
        assert!(!DocumentType::Doc.matches_path("/a/b.docx"));
    }

    #[test]
    fn document_type_from_str() {
        assert_eq!(".PDF".parse::<DocumentType>().ok(), Some(DocumentType::Pdf));
        assert!("exe".parse::<DocumentType>().is_err());
    }

    #[test]
    fn request_first_page_detection() {
        let req = SearchRequest::new("pump", DocumentType::Pdf);
        assert!(req.is_first_page());
        let mut cursors = BTreeMap::new();
        cursors.insert(Provider::Brave, Cursor { offset: 20 });
        let more = req.with_cursors(cursors);
        assert!(!more.is_first_page());
    }
}
