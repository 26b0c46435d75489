//! Built-in sample offers for offline runs.

use async_trait::async_trait;

use super::{target_cities, OfferSource, SourceError};
use crate::models::{AvailabilityStatus, Offer, OfferKind, SearchFilters, SourceType};
use crate::normalize::Normalizer;

/// `(city, name, stars, SAR per night, meters to the Haram, walking minutes)`
const DEMO_HOTELS: &[(&str, &str, u8, f64, u32, u32)] = &[
    ("Makkah", "Swissotel Al Maqam Makkah", 5, 850.0, 100, 2),
    ("Makkah", "Hilton Makkah Convention Hotel", 5, 750.0, 300, 5),
    ("Makkah", "Anjum Hotel Makkah", 4, 450.0, 500, 8),
    ("Makkah", "Al Shohada Hotel", 3, 250.0, 800, 12),
    ("Madinah", "Dar Al Taqwa Hotel", 5, 650.0, 100, 2),
    ("Madinah", "Madinah Hilton Hotel", 5, 550.0, 300, 5),
    ("Madinah", "Millennium Al Aqeeq Hotel", 4, 350.0, 500, 8),
    ("Madinah", "Al Noor Hotel Madinah", 3, 200.0, 700, 10),
];

/// Source serving a fixed set of hotels in Makkah and Madinah.
#[derive(Debug, Default)]
pub struct DemoSource;

impl DemoSource {
    pub fn new() -> Self {
        Self
    }

    /// Every demo hotel, regardless of filters.
    pub fn offers() -> Vec<Offer> {
        DEMO_HOTELS
            .iter()
            .enumerate()
            .map(|(i, (city, name, stars, price, distance, walking))| {
                let mut offer = Offer::new(SourceType::Demo, "demo", OfferKind::Hotel, *name, *city)
                    .with_stars(*stars)
                    .with_price_sar(*price)
                    .with_distance(*distance);
                offer.source_offer_id = Some(format!("demo_{}_{}", city.to_lowercase(), i + 1));
                offer.price_per_night_sar = Some(*price);
                offer.walking_minutes = Some(*walking);
                offer.currency_original = "SAR".to_string();
                offer.availability = AvailabilityStatus::Available;
                offer.confidence = 0.5;
                offer
            })
            .collect()
    }
}

#[async_trait]
impl OfferSource for DemoSource {
    fn name(&self) -> &str {
        "demo"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Demo
    }

    async fn fetch(&self, filters: &SearchFilters) -> Result<Vec<Offer>, SourceError> {
        let normalizer = Normalizer::new();
        let cities: Vec<String> = target_cities(filters)
            .iter()
            .map(|c| normalizer.normalize_city(c))
            .collect();
        Ok(Self::offers()
            .into_iter()
            .filter(|o| cities.iter().any(|c| c == &o.city))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_filters_by_city() {
        let source = DemoSource::new();
        let all = source.fetch(&SearchFilters::new()).await.unwrap();
        assert_eq!(all.len(), DEMO_HOTELS.len());

        let mecca = source.fetch(&SearchFilters::new().city("mecca")).await.unwrap();
        assert_eq!(mecca.len(), 4);
        assert!(mecca.iter().all(|o| o.city == "Makkah"));
        assert_eq!(mecca[0].source_offer_id.as_deref(), Some("demo_makkah_1"));
    }
}
