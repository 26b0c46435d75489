//! Cache key construction for aggregation queries.

use sha2::{Digest, Sha256};

use crate::models::SearchFilters;
use crate::normalize::Normalizer;

/// Build the query cache key for a set of filters.
///
/// Semantically identical queries map to the same key: the city is
/// canonicalized, the source list is sorted and deduplicated, and explicit
/// defaults (zero minimum price, zero star bound, empty source list) are
/// equivalent to leaving the field out. `force_refresh` never participates.
pub fn cache_key(filters: &SearchFilters) -> String {
    let city = filters
        .city
        .as_deref()
        .map(|c| Normalizer::new().normalize_city(c))
        .unwrap_or_default();

    let mut sources: Vec<String> = filters
        .sources
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    sources.sort();
    sources.dedup();

    let date = |d: Option<chrono::NaiveDate>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    };

    let canonical = format!(
        "city:{}|kind:{}|checkin:{}|checkout:{}|price:{}-{}|stars:{}+|sources:{}|sort:{}|limit:{}",
        city,
        filters.kind.map(|k| k.as_str()).unwrap_or(""),
        date(filters.check_in),
        date(filters.check_out),
        filters.min_price.filter(|p| *p > 0.0).unwrap_or(0.0),
        filters
            .max_price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "max".to_string()),
        filters.min_stars.unwrap_or(0),
        sources.join(","),
        filters.sort_by.as_str(),
        filters.limit,
    );

    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    format!("agg:{}", &digest[..32])
}

/// Key for one source's raw results. Only the fields sources query on take
/// part; price, star, sort and limit filters are applied after fetching.
pub fn source_cache_key(filters: &SearchFilters) -> String {
    let city = filters
        .city
        .as_deref()
        .map(|c| Normalizer::new().normalize_city(c))
        .unwrap_or_default();
    format!(
        "src:{}|{}|{}|{}",
        city,
        filters.kind.map(|k| k.as_str()).unwrap_or(""),
        filters.check_in.map(|d| d.to_string()).unwrap_or_default(),
        filters.check_out.map(|d| d.to_string()).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OfferKind, SortBy};

    #[test]
    fn test_source_order_does_not_matter() {
        let a = SearchFilters::new().city("Makkah").sources(["xotelo", "amadeus"]);
        let b = SearchFilters::new().city("Makkah").sources(["amadeus", "xotelo", "amadeus"]);
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn test_explicit_defaults_match_absent_values() {
        let implicit = SearchFilters::new().city("Makkah");
        let explicit = SearchFilters {
            min_price: Some(0.0),
            min_stars: Some(0),
            sources: Vec::new(),
            sort_by: SortBy::Price,
            ..SearchFilters::new().city("Makkah")
        };
        assert_eq!(cache_key(&implicit), cache_key(&explicit));
    }

    #[test]
    fn test_city_spelling_variants_collide() {
        let a = SearchFilters::new().city("mecca").kind(OfferKind::Hotel);
        let b = SearchFilters::new().city("Makkah").kind(OfferKind::Hotel);
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn test_force_refresh_ignored() {
        let a = SearchFilters::new().city("Makkah");
        let b = SearchFilters::new().city("Makkah").force_refresh(true);
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn test_distinct_filters_differ() {
        let base = SearchFilters::new().city("Makkah");
        assert_ne!(cache_key(&base), cache_key(&base.clone().min_stars(4)));
        assert_ne!(cache_key(&base), cache_key(&base.clone().kind(OfferKind::Package)));
        assert_ne!(
            cache_key(&base),
            cache_key(&base.clone().price_range(None, Some(2_000_000.0)))
        );
        assert_ne!(cache_key(&base), cache_key(&SearchFilters::new().city("Madinah")));
    }

    #[test]
    fn test_source_key_ignores_post_fetch_filters() {
        let base = SearchFilters::new().city("mecca");
        let narrowed = SearchFilters::new()
            .city("Makkah")
            .min_stars(5)
            .sort_by(SortBy::Stars)
            .limit(3);
        assert_eq!(source_cache_key(&base), source_cache_key(&narrowed));
        assert_eq!(source_cache_key(&base), "src:Makkah|||");
    }
}
