//! Search orchestrator: concurrent fan-out, merge, classification, caching.
//!
//! This module dispatches a planned query to every eligible provider at
//! once, collapses the pages onto canonical URLs, classifies each result
//! and orders the merged list deterministically.

pub mod aggregate;
pub mod merge;
pub mod url_normalize;

pub use aggregate::{AggregateOutcome, Aggregator, DispatchPlan};
