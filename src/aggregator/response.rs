//! Result envelope and errors for aggregation queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{FieldError, Offer, SearchFilters};

/// A source that failed during one aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

/// Everything returned by one aggregation query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub offers: Vec<Offer>,
    /// Offers that passed the filters before the limit was applied.
    pub total_found: usize,
    pub total_returned: usize,
    /// Raw offers received from each source that answered.
    pub source_counts: BTreeMap<String, usize>,
    pub cache_hit: bool,
    pub errors: Vec<SourceFailure>,
    pub aggregated_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub filters: SearchFilters,
}

impl AggregateResponse {
    pub fn cheapest(&self) -> Option<&Offer> {
        self.offers
            .iter()
            .filter_map(|o| o.effective_price_idr().map(|p| (p, o)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, o)| o)
    }
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Invalid query: {}", join_errors(.0))]
    InvalidQuery(Vec<FieldError>),

    #[error("All sources failed: {}", join_failures(.0))]
    AllSourcesFailed(Vec<SourceFailure>),
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.source, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}
