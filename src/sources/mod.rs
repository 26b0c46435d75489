//! Source adapters feeding the aggregator.
//!
//! Each adapter turns one upstream (a JSON API, an OTA results page, the
//! partner feed table, the local offer store) into raw [`Offer`]s. Adapters
//! do not normalize; the aggregator does that once for every source.

mod api;
mod database;
mod demo;
mod partner;
mod scraper;

pub use api::{ApiProvider, ApiSource, ApiSourceConfig};
pub use database::DatabaseSource;
pub use demo::DemoSource;
pub use partner::{feed_to_offer, PartnerSource, PARTNER_SOURCE_NAME};
pub use scraper::{ScraperSource, ScraperTarget};

use async_trait::async_trait;
use thiserror::Error;

use crate::http_client::HttpError;
use crate::models::{Offer, SearchFilters, SourceType};
use crate::repository::StoreError;

/// Errors raised by a single source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid source configuration: {0}")]
    Config(String),
}

/// An upstream the aggregator can query for offers.
#[async_trait]
pub trait OfferSource: Send + Sync {
    /// Name reported in `source_counts` and failure lists.
    fn name(&self) -> &str;

    fn source_type(&self) -> SourceType;

    /// Fallback sources are only consulted when primary sources came back
    /// short of the requested limit.
    fn is_fallback(&self) -> bool {
        false
    }

    async fn fetch(&self, filters: &SearchFilters) -> Result<Vec<Offer>, SourceError>;
}

/// Cities queried when the filters leave the city open.
pub(crate) const DEFAULT_CITIES: &[&str] = &["Makkah", "Madinah"];

/// Cities a search should cover.
pub(crate) fn target_cities(filters: &SearchFilters) -> Vec<String> {
    match filters.city.as_deref().map(str::trim) {
        Some(city) if !city.is_empty() => vec![city.to_string()],
        _ => DEFAULT_CITIES.iter().map(|c| c.to_string()).collect(),
    }
}

/// Convert an amount to SAR. Unknown currencies yield `None`.
pub fn to_sar(amount: f64, currency: &str) -> Option<f64> {
    let rate = match currency.trim().to_ascii_uppercase().as_str() {
        "SAR" | "" => 1.0,
        "USD" => 3.75,
        "EUR" => 4.10,
        "IDR" => return Some(crate::models::idr_to_sar(amount)),
        _ => return None,
    };
    Some((amount * rate * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sar() {
        assert_eq!(to_sar(100.0, "usd"), Some(375.0));
        assert_eq!(to_sar(100.0, "EUR"), Some(410.0));
        assert_eq!(to_sar(100.0, "SAR"), Some(100.0));
        assert_eq!(to_sar(425_000.0, "IDR"), Some(100.0));
        assert_eq!(to_sar(100.0, "JPY"), None);
    }

    #[test]
    fn test_target_cities() {
        assert_eq!(target_cities(&SearchFilters::new()), vec!["Makkah", "Madinah"]);
        assert_eq!(target_cities(&SearchFilters::new().city("Jeddah")), vec!["Jeddah"]);
        assert_eq!(target_cities(&SearchFilters::new().city("  ")).len(), 2);
    }
}
