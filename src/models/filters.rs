//! Search filters accepted by the aggregator and the storage search.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Offer, OfferKind};
use crate::normalize::Normalizer;

/// Default maximum number of offers returned by a search.
pub const DEFAULT_LIMIT: usize = 50;

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Cheapest first, unpriced offers last.
    #[default]
    Price,
    PriceDesc,
    /// Highest star rating first.
    Stars,
    /// Closest to the Haram first, unknown distance last.
    Distance,
    /// Most recently refreshed first.
    Updated,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::PriceDesc => "price_desc",
            Self::Stars => "stars",
            Self::Distance => "distance",
            Self::Updated => "updated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "price" | "price_asc" => Some(Self::Price),
            "price_desc" => Some(Self::PriceDesc),
            "stars" => Some(Self::Stars),
            "distance" => Some(Self::Distance),
            "updated" => Some(Self::Updated),
            _ => None,
        }
    }

    /// Sort offers in place. The sort is stable; offers missing the sort
    /// attribute go last.
    pub fn sort(&self, offers: &mut [Offer]) {
        match self {
            Self::Price => offers.sort_by(|a, b| {
                nulls_last(a.effective_price_idr(), b.effective_price_idr(), f64::total_cmp)
            }),
            Self::PriceDesc => offers.sort_by(|a, b| {
                nulls_last(a.effective_price_idr(), b.effective_price_idr(), |x, y| {
                    y.total_cmp(x)
                })
            }),
            Self::Stars => offers.sort_by(|a, b| nulls_last(a.stars, b.stars, |x, y| y.cmp(x))),
            Self::Distance => {
                offers.sort_by(|a, b| nulls_last(a.distance_m, b.distance_m, |x, y| x.cmp(y)))
            }
            Self::Updated => offers.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at)),
        }
    }
}

fn nulls_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(&a, &b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A validation problem tied to one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Parameters of an aggregation query. Prices are in IDR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub city: Option<String>,
    pub kind: Option<OfferKind>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_stars: Option<u8>,
    /// Source names to keep. Empty means all sources.
    pub sources: Vec<String>,
    pub sort_by: SortBy,
    pub limit: usize,
    /// Skip both cache levels and query every source.
    pub force_refresh: bool,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            city: None,
            kind: None,
            check_in: None,
            check_out: None,
            min_price: None,
            max_price: None,
            min_stars: None,
            sources: Vec::new(),
            sort_by: SortBy::Price,
            limit: DEFAULT_LIMIT,
            force_refresh: false,
        }
    }
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn kind(mut self, kind: OfferKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn min_stars(mut self, stars: u8) -> Self {
        self.min_stars = Some(stars);
        self
    }

    pub fn price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Whether an offer satisfies every filter. Offers without a price never
    /// satisfy an explicit price bound, and offers without a star rating never
    /// satisfy a star bound.
    pub fn matches(&self, offer: &Offer) -> bool {
        if let Some(city) = self.city.as_deref().filter(|c| !c.trim().is_empty()) {
            let city = Normalizer::new().normalize_city(city);
            if !offer.city.eq_ignore_ascii_case(&city) {
                return false;
            }
        }

        if self.kind.is_some_and(|kind| kind != offer.kind) {
            return false;
        }

        let price = offer.effective_price_idr();
        if let Some(min) = self.min_price.filter(|p| *p > 0.0) {
            if !price.is_some_and(|p| p >= min) {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if !price.is_some_and(|p| p <= max) {
                return false;
            }
        }

        if let Some(min_stars) = self.min_stars.filter(|s| *s > 0) {
            if !offer.stars.is_some_and(|s| s >= min_stars) {
                return false;
            }
        }

        if !self.sources.is_empty()
            && !self
                .sources
                .iter()
                .any(|s| s.trim().eq_ignore_ascii_case(&offer.source_name))
        {
            return false;
        }

        for date in [self.check_in, self.check_out].into_iter().flatten() {
            if offer.valid_from.is_some_and(|from| date < from)
                || offer.valid_until.is_some_and(|until| date > until)
            {
                return false;
            }
        }
        if let (Some(wanted), Some(actual)) = (self.check_in, offer.check_in) {
            if wanted != actual {
                return false;
            }
        }

        true
    }

    /// Check the filters for contradictions, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.min_price.is_some_and(|p| p < 0.0) {
            errors.push(FieldError::new("min_price", "must not be negative"));
        }
        if self.max_price.is_some_and(|p| p < 0.0) {
            errors.push(FieldError::new("max_price", "must not be negative"));
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                errors.push(FieldError::new(
                    "min_price",
                    format!("{} is greater than max_price {}", min, max),
                ));
            }
        }
        if let Some(stars) = self.min_stars {
            if !(1..=5).contains(&stars) {
                errors.push(FieldError::new("min_stars", "must be between 1 and 5"));
            }
        }
        if let (Some(check_in), Some(check_out)) = (self.check_in, self.check_out) {
            if check_in > check_out {
                errors.push(FieldError::new("check_in", "must not be after check_out"));
            }
        }
        if self.limit == 0 {
            errors.push(FieldError::new("limit", "must be at least 1"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn hotel(source: &str, price: Option<f64>, stars: Option<u8>) -> Offer {
        let mut offer = Offer::new(SourceType::Api, source, OfferKind::Hotel, "Elaf Kinda", "Makkah");
        offer.price_idr = price;
        offer.stars = stars;
        offer
    }

    #[test]
    fn test_matches_city_variants_and_kind() {
        let offer = hotel("xotelo", Some(1_000_000.0), Some(4));
        assert!(SearchFilters::new().city("mecca").matches(&offer));
        assert!(SearchFilters::new().city("MAKKAH").matches(&offer));
        assert!(!SearchFilters::new().city("Madinah").matches(&offer));
        assert!(!SearchFilters::new().kind(OfferKind::Package).matches(&offer));
    }

    #[test]
    fn test_matches_price_and_stars() {
        let offer = hotel("xotelo", Some(1_000_000.0), Some(4));
        assert!(SearchFilters::new().price_range(Some(900_000.0), Some(1_000_000.0)).matches(&offer));
        assert!(!SearchFilters::new().price_range(None, Some(999_999.0)).matches(&offer));
        assert!(SearchFilters::new().min_stars(4).matches(&offer));
        assert!(!SearchFilters::new().min_stars(5).matches(&offer));

        let unrated = hotel("xotelo", None, None);
        assert!(!SearchFilters::new().min_stars(1).matches(&unrated));
        assert!(!SearchFilters::new().price_range(None, Some(5_000_000.0)).matches(&unrated));
        assert!(SearchFilters::new().matches(&unrated));
    }

    #[test]
    fn test_matches_sources_case_insensitive() {
        let offer = hotel("Xotelo", Some(1.0), None);
        assert!(SearchFilters::new().sources(["xotelo"]).matches(&offer));
        assert!(!SearchFilters::new().sources(["amadeus"]).matches(&offer));
    }

    #[test]
    fn test_matches_validity_window() {
        let mut offer = hotel("partner", Some(1.0), None);
        offer.valid_from = NaiveDate::from_ymd_opt(2026, 11, 1);
        offer.valid_until = NaiveDate::from_ymd_opt(2026, 11, 30);
        let mut filters = SearchFilters::new();
        filters.check_in = NaiveDate::from_ymd_opt(2026, 11, 10);
        assert!(filters.matches(&offer));
        filters.check_in = NaiveDate::from_ymd_opt(2026, 12, 10);
        assert!(!filters.matches(&offer));
    }

    #[test]
    fn test_sort_price_nulls_last() {
        let mut offers = vec![
            hotel("a", None, None),
            hotel("b", Some(2.0), None),
            hotel("c", Some(0.0), None),
            hotel("d", Some(1.0), None),
        ];
        SortBy::Price.sort(&mut offers);
        let order: Vec<_> = offers.iter().map(|o| o.source_name.as_str()).collect();
        assert_eq!(order, vec!["d", "b", "a", "c"]);

        SortBy::PriceDesc.sort(&mut offers);
        let order: Vec<_> = offers.iter().map(|o| o.source_name.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_sort_stars_and_distance() {
        let mut offers = vec![
            hotel("a", None, Some(3)).with_distance(300),
            hotel("b", None, None),
            hotel("c", None, Some(5)).with_distance(100),
        ];
        SortBy::Stars.sort(&mut offers);
        assert_eq!(offers[0].source_name, "c");
        assert_eq!(offers[2].source_name, "b");

        SortBy::Distance.sort(&mut offers);
        assert_eq!(offers[0].source_name, "c");
        assert_eq!(offers[1].source_name, "a");
        assert_eq!(offers[2].source_name, "b");
    }

    #[test]
    fn test_default_filters_are_valid() {
        assert!(SearchFilters::new().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let filters = SearchFilters {
            min_price: Some(5_000_000.0),
            max_price: Some(1_000_000.0),
            min_stars: Some(7),
            limit: 0,
            ..Default::default()
        };
        let errors = filters.validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["min_price", "min_stars", "limit"]);
    }

    #[test]
    fn test_validate_dates() {
        let filters = SearchFilters {
            check_in: NaiveDate::from_ymd_opt(2026, 12, 10),
            check_out: NaiveDate::from_ymd_opt(2026, 12, 1),
            ..Default::default()
        };
        let errors = filters.validate().unwrap_err();
        assert_eq!(errors[0].field, "check_in");
    }

    #[test]
    fn test_sort_by_parse() {
        assert_eq!(SortBy::from_str("price_asc"), Some(SortBy::Price));
        assert_eq!(SortBy::from_str("distance"), Some(SortBy::Distance));
        assert_eq!(SortBy::from_str("random"), None);
    }
}
