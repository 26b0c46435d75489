//! Approved partner feeds exposed as package offers.

use std::sync::Arc;

use async_trait::async_trait;

use super::{OfferSource, SourceError};
use crate::models::{AvailabilityStatus, Offer, OfferKind, PartnerFeed, SearchFilters, SourceType};
use crate::repository::OfferStore;

pub const PARTNER_SOURCE_NAME: &str = "partner";

/// City used for feeds that do not name a departure city.
const DEFAULT_DEPARTURE_CITY: &str = "Jakarta";

/// Source reading approved partner feeds from storage.
pub struct PartnerSource {
    store: Arc<dyn OfferStore>,
}

impl PartnerSource {
    pub fn new(store: Arc<dyn OfferStore>) -> Self {
        Self { store }
    }
}

/// Convert a partner feed into a package offer.
pub fn feed_to_offer(feed: &PartnerFeed) -> Offer {
    let name = if feed.package_name.trim().is_empty() {
        feed.feed_name.clone()
    } else {
        feed.package_name.clone()
    };
    let city = feed
        .departure_city
        .clone()
        .unwrap_or_else(|| DEFAULT_DEPARTURE_CITY.to_string());

    let mut offer = Offer::new(
        SourceType::Partner,
        PARTNER_SOURCE_NAME,
        OfferKind::Package,
        name,
        city,
    );
    offer.source_offer_id = Some(feed.id.clone());
    offer.duration_days = feed.duration_days;
    offer.departure_city = feed.departure_city.clone();
    offer.airline = feed.airline.clone();
    offer.hotel_makkah = feed.hotel_makkah.clone();
    offer.hotel_makkah_stars = feed.hotel_makkah_stars;
    offer.hotel_madinah = feed.hotel_madinah.clone();
    offer.hotel_madinah_stars = feed.hotel_madinah_stars;
    offer.inclusions = feed.inclusions.clone();
    offer.price_idr = Some(feed.price_idr);
    offer.price_sar = feed.price_sar;
    offer.currency_original = "IDR".to_string();
    offer.quota = Some(feed.quota);
    offer.rooms_left = Some(feed.remaining_quota());
    offer.is_available = feed.is_available && feed.remaining_quota() > 0;
    offer.availability = match (offer.is_available, feed.remaining_quota()) {
        (false, _) => AvailabilityStatus::SoldOut,
        (true, 1..=5) => AvailabilityStatus::LastRooms,
        (true, _) => AvailabilityStatus::Available,
    };
    offer.valid_from = feed.valid_from;
    offer.valid_until = feed.valid_until;
    offer.confidence = 0.95;
    offer.scraped_at = feed.approved_at.unwrap_or(feed.submitted_at);
    offer
}

#[async_trait]
impl OfferSource for PartnerSource {
    fn name(&self) -> &str {
        PARTNER_SOURCE_NAME
    }

    fn source_type(&self) -> SourceType {
        SourceType::Partner
    }

    async fn fetch(&self, filters: &SearchFilters) -> Result<Vec<Offer>, SourceError> {
        // Partner feeds are keyed by departure city, not by Makkah/Madinah.
        let city = filters.city.as_deref().filter(|c| !c.trim().is_empty());
        let feeds = self.store.approved_partner_feeds(city).await?;
        Ok(feeds.iter().map(feed_to_offer).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeedStatus;
    use crate::repository::MemoryStore;
    use chrono::Utc;

    fn feed(id: &str, city: Option<&str>, quota: u32, booked: u32) -> PartnerFeed {
        PartnerFeed {
            id: id.to_string(),
            partner_id: "travel-berkah".to_string(),
            feed_name: "Promo Desember".to_string(),
            feed_kind: OfferKind::Package,
            price_idr: 32_500_000.0,
            price_sar: None,
            price_per_person_idr: None,
            package_name: String::new(),
            description: None,
            hotel_makkah: Some("Elaf Kinda".to_string()),
            hotel_makkah_stars: Some(4),
            hotel_madinah: None,
            hotel_madinah_stars: None,
            duration_days: Some(12),
            departure_city: city.map(str::to_string),
            departure_dates: Vec::new(),
            airline: Some("Saudia".to_string()),
            flight_class: "economy".to_string(),
            room_type: "quad".to_string(),
            inclusions: vec!["visa".to_string()],
            exclusions: Vec::new(),
            quota,
            booked,
            is_available: true,
            valid_from: None,
            valid_until: None,
            commission_rate: 0.0,
            status: FeedStatus::Approved,
            submitted_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            rejection_reason: None,
        }
    }

    #[test]
    fn test_feed_to_offer() {
        let offer = feed_to_offer(&feed("f1", None, 40, 38));
        assert_eq!(offer.name, "Promo Desember");
        assert_eq!(offer.city, "Jakarta");
        assert_eq!(offer.source_name, "partner");
        assert_eq!(offer.kind, OfferKind::Package);
        assert_eq!(offer.confidence, 0.95);
        assert_eq!(offer.rooms_left, Some(2));
        assert_eq!(offer.availability, AvailabilityStatus::LastRooms);
        assert!(offer.is_available);
    }

    #[test]
    fn test_full_quota_is_unavailable() {
        let offer = feed_to_offer(&feed("f1", Some("Surabaya"), 10, 10));
        assert!(!offer.is_available);
        assert_eq!(offer.availability, AvailabilityStatus::SoldOut);
        assert_eq!(offer.city, "Surabaya");
    }

    #[tokio::test]
    async fn test_fetch_only_approved() {
        let store = Arc::new(MemoryStore::new());
        store.insert_feed(&feed("f1", Some("Jakarta"), 40, 0)).await.unwrap();
        let mut pending = feed("f2", Some("Jakarta"), 40, 0);
        pending.status = FeedStatus::Pending;
        store.insert_feed(&pending).await.unwrap();

        let source = PartnerSource::new(store);
        let offers = source.fetch(&SearchFilters::new()).await.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].source_offer_id.as_deref(), Some("f1"));
    }
}
