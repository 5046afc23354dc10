//! Provider adapter trait.
//!
//! Every search provider is adapted into [`SearchProvider`]. Adding a
//! provider means adding one implementation; the aggregator only sees
//! this trait.

use async_trait::async_trait;

use crate::error::SearchError;
use crate::types::{Cursor, Provider, RawResult};

/// One page of results from one provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderPage {
    pub results: Vec<RawResult>,
    /// Where the next page starts, or `None` when the provider is done.
    pub next: Option<Cursor>,
}

impl ProviderPage {
    /// An empty, finished page.
    pub fn done() -> Self {
        Self::default()
    }
}

/// Uniform interface over search providers.
///
/// Implementations must be `Send + Sync` to allow concurrent fan-out from
/// the aggregator via `Arc<dyn SearchProvider>`.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Which provider this adapter talks to.
    fn id(&self) -> Provider;

    /// Results requested per page.
    fn page_size(&self) -> u32;

    /// Offset at which the provider stops returning results. Requests at
    /// or past it report `done` without a network call.
    fn max_offset(&self) -> u32;

    /// Fetch one page for an already-planned provider query.
    ///
    /// # Errors
    ///
    /// Returns an error for this page only (timeout, quota, malformed
    /// response); it never affects other providers.
    async fn fetch(&self, query: &str, cursor: Cursor) -> Result<ProviderPage, SearchError>;
}

/// Whether `cursor` is at or beyond the provider's ceiling.
pub fn past_ceiling(cursor: Cursor, max_offset: u32) -> bool {
    cursor.offset >= max_offset
}

/// Cursor for the page after `cursor`, given how many results came back.
///
/// A short page means the provider has nothing more; reaching the
/// ceiling means it will not serve more.
pub fn next_cursor(cursor: Cursor, returned: usize, page_size: u32, max_offset: u32) -> Option<Cursor> {
    if returned < page_size as usize {
        return None;
    }
    let next = cursor.offset.saturating_add(page_size);
    (next < max_offset).then_some(Cursor { offset: next })
}
