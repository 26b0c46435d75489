//! Canonical offer model shared by every source.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fixed SAR to IDR exchange rate.
pub const SAR_TO_IDR: f64 = 4250.0;

/// Convert SAR to IDR, rounded to whole rupiah.
pub fn sar_to_idr(sar: f64) -> f64 {
    (sar * SAR_TO_IDR).round()
}

/// Convert IDR to SAR, rounded to two decimals.
pub fn idr_to_sar(idr: f64) -> f64 {
    (idr / SAR_TO_IDR * 100.0).round() / 100.0
}

/// Where an offer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Api,
    Scraper,
    Partner,
    Demo,
    Cache,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Scraper => "scraper",
            Self::Partner => "partner",
            Self::Demo => "demo",
            Self::Cache => "cache",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "api" => Some(Self::Api),
            "scraper" => Some(Self::Scraper),
            "partner" => Some(Self::Partner),
            "demo" => Some(Self::Demo),
            "cache" => Some(Self::Cache),
            _ => None,
        }
    }
}

/// What is being offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    Hotel,
    Package,
    Flight,
}

impl OfferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hotel => "hotel",
            Self::Package => "package",
            Self::Flight => "flight",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "hotel" => Some(Self::Hotel),
            "package" => Some(Self::Package),
            "flight" => Some(Self::Flight),
            _ => None,
        }
    }
}

/// Coarse availability reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Limited,
    LastRooms,
    SoldOut,
    #[default]
    Unknown,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Limited => "limited",
            Self::LastRooms => "last_rooms",
            Self::SoldOut => "sold_out",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "limited" => Some(Self::Limited),
            "last_rooms" => Some(Self::LastRooms),
            "sold_out" => Some(Self::SoldOut),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// A single priced listing for a hotel, flight or package from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Storage id, assigned once the offer has been persisted.
    pub id: Option<String>,
    /// Identity hash over the non-price identity fields.
    pub offer_hash: String,
    pub source_type: SourceType,
    pub source_name: String,
    /// Identifier of the offer inside its source, when the source has one.
    pub source_offer_id: Option<String>,
    pub kind: OfferKind,

    pub name: String,
    pub name_normalized: String,
    pub city: String,

    // Hotel attributes
    pub stars: Option<u8>,
    /// Distance to the Haram in meters.
    pub distance_m: Option<u32>,
    pub walking_minutes: Option<u32>,
    pub amenities: Vec<String>,
    pub hotel_chain: Option<String>,

    // Package attributes
    pub duration_days: Option<u32>,
    pub departure_city: Option<String>,
    pub airline: Option<String>,
    pub hotel_makkah: Option<String>,
    pub hotel_makkah_stars: Option<u8>,
    pub hotel_madinah: Option<String>,
    pub hotel_madinah_stars: Option<u8>,
    pub inclusions: Vec<String>,

    // Flight attributes
    pub route: Option<String>,
    pub departure_time: Option<DateTime<Utc>>,

    pub price_sar: Option<f64>,
    pub price_idr: Option<f64>,
    pub price_per_night_sar: Option<f64>,
    pub price_per_night_idr: Option<f64>,
    /// Currency the source quoted in.
    pub currency_original: String,

    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,

    pub is_available: bool,
    pub availability: AvailabilityStatus,
    pub rooms_left: Option<u32>,
    pub quota: Option<u32>,

    pub source_url: Option<String>,
    /// How much the source is trusted, in [0, 1].
    pub confidence: f64,
    /// When the source last refreshed this offer.
    pub scraped_at: DateTime<Utc>,
}

impl Offer {
    /// Create a bare offer. Prices and attributes are filled in by the caller.
    pub fn new(
        source_type: SourceType,
        source_name: impl Into<String>,
        kind: OfferKind,
        name: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            offer_hash: String::new(),
            source_type,
            source_name: source_name.into(),
            source_offer_id: None,
            kind,
            name: name.into(),
            name_normalized: String::new(),
            city: city.into(),
            stars: None,
            distance_m: None,
            walking_minutes: None,
            amenities: Vec::new(),
            hotel_chain: None,
            duration_days: None,
            departure_city: None,
            airline: None,
            hotel_makkah: None,
            hotel_makkah_stars: None,
            hotel_madinah: None,
            hotel_madinah_stars: None,
            inclusions: Vec::new(),
            route: None,
            departure_time: None,
            price_sar: None,
            price_idr: None,
            price_per_night_sar: None,
            price_per_night_idr: None,
            currency_original: "IDR".to_string(),
            check_in: None,
            check_out: None,
            valid_from: None,
            valid_until: None,
            is_available: true,
            availability: AvailabilityStatus::Unknown,
            rooms_left: None,
            quota: None,
            source_url: None,
            confidence: 1.0,
            scraped_at: Utc::now(),
        }
    }

    pub fn with_stars(mut self, stars: u8) -> Self {
        self.stars = Some(stars);
        self
    }

    pub fn with_price_idr(mut self, price: f64) -> Self {
        self.price_idr = Some(price);
        self
    }

    pub fn with_price_sar(mut self, price: f64) -> Self {
        self.price_sar = Some(price);
        self
    }

    pub fn with_distance(mut self, meters: u32) -> Self {
        self.distance_m = Some(meters);
        self
    }

    pub fn with_duration(mut self, days: u32) -> Self {
        self.duration_days = Some(days);
        self
    }

    /// Compute the identity hash from the non-price identity fields.
    pub fn compute_hash(&self) -> String {
        let key = format!(
            "{}|{}|{}|{}|{}|{}",
            self.source_name,
            self.kind.as_str(),
            self.name_normalized,
            self.city,
            self.stars.map(|s| s.to_string()).unwrap_or_default(),
            self.duration_days
                .map(|d| d.to_string())
                .unwrap_or_default(),
        );
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        digest[..32].to_string()
    }

    /// IDR price if it is known and positive.
    pub fn effective_price_idr(&self) -> Option<f64> {
        self.price_idr.filter(|p| *p > 0.0)
    }

    /// Date component of the storage conflict key.
    pub fn validity_key(&self) -> String {
        self.check_in
            .or(self.valid_from)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Offer {
        let mut offer = Offer::new(
            SourceType::Api,
            "xotelo",
            OfferKind::Hotel,
            "Grand Zam Zam Tower",
            "Makkah",
        )
        .with_stars(4)
        .with_price_idr(1_500_000.0);
        offer.name_normalized = "grand zam zam tower".to_string();
        offer
    }

    #[test]
    fn test_currency_round_trip() {
        for sar in [0.01, 1.0, 99.99, 352.94, 1234.56, 118_000.0] {
            let back = idr_to_sar(sar_to_idr(sar));
            assert!((back - sar).abs() <= 0.01, "{} -> {}", sar, back);
        }
    }

    #[test]
    fn test_currency_conversion_values() {
        assert_eq!(sar_to_idr(100.0), 425_000.0);
        assert_eq!(idr_to_sar(1_500_000.0), 352.94);
    }

    #[test]
    fn test_hash_ignores_price() {
        let a = sample();
        let b = sample().with_price_idr(9_999_999.0).with_price_sar(12.0);
        assert_eq!(a.compute_hash(), b.compute_hash());
        assert_eq!(a.compute_hash().len(), 32);
    }

    #[test]
    fn test_hash_changes_with_identity_fields() {
        let base = sample().compute_hash();

        let mut other = sample();
        other.name_normalized = "hilton suites".to_string();
        assert_ne!(base, other.compute_hash());

        let mut other = sample();
        other.city = "Madinah".to_string();
        assert_ne!(base, other.compute_hash());

        let mut other = sample();
        other.kind = OfferKind::Package;
        assert_ne!(base, other.compute_hash());

        assert_ne!(base, sample().with_stars(5).compute_hash());
        assert_ne!(base, sample().with_duration(9).compute_hash());
    }

    #[test]
    fn test_enum_round_trip() {
        for s in ["api", "scraper", "partner", "demo", "cache"] {
            assert_eq!(SourceType::from_str(s).map(|t| t.as_str()), Some(s));
        }
        for s in ["available", "limited", "last_rooms", "sold_out", "unknown"] {
            assert_eq!(AvailabilityStatus::from_str(s).map(|t| t.as_str()), Some(s));
        }
        assert_eq!(OfferKind::from_str("flight"), Some(OfferKind::Flight));
        assert_eq!(OfferKind::from_str("cruise"), None);
    }

    #[test]
    fn test_validity_key() {
        let mut offer = sample();
        assert_eq!(offer.validity_key(), "");
        offer.valid_from = NaiveDate::from_ymd_opt(2026, 11, 1);
        assert_eq!(offer.validity_key(), "2026-11-01");
        offer.check_in = NaiveDate::from_ymd_opt(2026, 12, 5);
        assert_eq!(offer.validity_key(), "2026-12-05");
    }

    #[test]
    fn test_effective_price_treats_zero_as_missing() {
        assert_eq!(sample().with_price_idr(0.0).effective_price_idr(), None);
        assert_eq!(sample().effective_price_idr(), Some(1_500_000.0));
    }
}
