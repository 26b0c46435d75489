//! Offer normalization.
//!
//! Brings offers from every source into one canonical shape: normalized
//! names for comparison, canonical city spellings, clamped star ratings,
//! both currencies, and a freshly computed identity hash.

pub mod dedup;

pub use dedup::{name_similarity, DedupConfig, Deduplicator};

use crate::models::{idr_to_sar, sar_to_idr, AvailabilityStatus, Offer};

/// Known Arabic tokens and their Latin transliteration.
const ARABIC_TOKENS: &[(&str, &str)] = &[
    ("الهلتون", "hilton"),
    ("ماريوت", "marriott"),
    ("سويسوتيل", "swissotel"),
    ("بولمان", "pullman"),
    ("فندق", "hotel"),
    ("مكة", "makkah"),
    ("مكه", "makkah"),
    ("المدينة", "madinah"),
    ("المنورة", "madinah"),
];

const NAME_PREFIXES: &[&str] = &["hotel ", "the ", "al "];
const NAME_SUFFIXES: &[&str] = &[" hotel", " makkah", " mecca", " madinah", " medina"];

const MAKKAH_VARIANTS: &[&str] = &["makkah", "mecca", "makka", "mekka", "مكة", "مكه"];
const MADINAH_VARIANTS: &[&str] = &["madinah", "medina", "madina", "المدينة", "المنورة"];
const JEDDAH_VARIANTS: &[&str] = &["jeddah", "jedda", "jidda", "جدة"];

/// Hotel chains recognised in normalized names.
const HOTEL_CHAINS: &[(&str, &str)] = &[
    ("hilton", "Hilton"),
    ("marriott", "Marriott"),
    ("sheraton", "Sheraton"),
    ("swissotel", "Swissôtel"),
    ("pullman", "Pullman"),
    ("sofitel", "Sofitel"),
    ("raffles", "Raffles"),
    ("fairmont", "Fairmont"),
    ("movenpick", "Mövenpick"),
    ("intercontinental", "InterContinental"),
    ("hyatt", "Hyatt"),
    ("conrad", "Conrad"),
    ("rotana", "Rotana"),
];

/// Upper bound on normalization passes; every pass only shrinks or
/// transliterates, so names settle after two or three.
const MAX_NAME_PASSES: usize = 8;

/// Normalizes offers from different sources into a common format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize an offer. Applying this twice yields the same offer.
    pub fn normalize(&self, mut offer: Offer) -> Offer {
        offer.name_normalized = self.normalize_name(&offer.name);
        offer.city = self.normalize_city(&offer.city);
        normalize_prices(&mut offer);

        offer.stars = offer.stars.map(clamp_stars);
        offer.hotel_makkah_stars = offer.hotel_makkah_stars.map(clamp_stars);
        offer.hotel_madinah_stars = offer.hotel_madinah_stars.map(clamp_stars);
        offer.confidence = offer.confidence.clamp(0.0, 1.0);

        if offer.availability == AvailabilityStatus::Unknown {
            offer.availability = if offer.is_available {
                AvailabilityStatus::Available
            } else {
                AvailabilityStatus::SoldOut
            };
        }

        if offer.hotel_chain.is_none() {
            offer.hotel_chain = detect_chain(&offer.name_normalized).map(str::to_string);
        }

        offer.offer_hash = offer.compute_hash();
        offer
    }

    /// Normalize a hotel or package name for comparison.
    pub fn normalize_name(&self, name: &str) -> String {
        let mut current = name.trim().to_string();
        for _ in 0..MAX_NAME_PASSES {
            let next = normalize_name_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Map a city to its canonical spelling; unknown cities are title-cased.
    pub fn normalize_city(&self, city: &str) -> String {
        let trimmed = city.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let lower = trimmed.to_lowercase();
        if MAKKAH_VARIANTS.contains(&lower.as_str()) {
            "Makkah".to_string()
        } else if MADINAH_VARIANTS.contains(&lower.as_str()) {
            "Madinah".to_string()
        } else if JEDDAH_VARIANTS.contains(&lower.as_str()) {
            "Jeddah".to_string()
        } else {
            title_case(trimmed)
        }
    }
}

fn normalize_name_pass(name: &str) -> String {
    let mut normalized = name.trim().to_string();

    for (arabic, latin) in ARABIC_TOKENS {
        normalized = normalized.replace(arabic, latin);
    }

    normalized = normalized.to_lowercase();
    normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    loop {
        let before = normalized.len();
        for prefix in NAME_PREFIXES {
            if let Some(rest) = normalized.strip_prefix(prefix) {
                normalized = rest.trim_start().to_string();
            }
        }
        for suffix in NAME_SUFFIXES {
            if let Some(rest) = normalized.strip_suffix(suffix) {
                normalized = rest.trim_end().to_string();
            }
        }
        if normalized.len() == before {
            break;
        }
    }

    // Affixes go first, then stray punctuation.
    let kept: String = normalized
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '-' | '&'))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_prices(offer: &mut Offer) {
    let idr = offer.price_idr.filter(|p| *p > 0.0);
    let sar = offer.price_sar.filter(|p| *p > 0.0);
    match (idr, sar) {
        (Some(idr), None) => offer.price_sar = Some(idr_to_sar(idr)),
        (None, Some(sar)) => offer.price_idr = Some(sar_to_idr(sar)),
        _ => {}
    }

    let idr = offer.price_per_night_idr.filter(|p| *p > 0.0);
    let sar = offer.price_per_night_sar.filter(|p| *p > 0.0);
    match (idr, sar) {
        (Some(idr), None) => offer.price_per_night_sar = Some(idr_to_sar(idr)),
        (None, Some(sar)) => offer.price_per_night_idr = Some(sar_to_idr(sar)),
        _ => {}
    }
}

fn clamp_stars(stars: u8) -> u8 {
    stars.clamp(1, 5)
}

fn detect_chain(name_normalized: &str) -> Option<&'static str> {
    HOTEL_CHAINS
        .iter()
        .find(|(key, _)| name_normalized.contains(key))
        .map(|(_, display)| *display)
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

/// Estimate a star rating from a provider's rating field, which may be a
/// number or a descriptive string.
pub fn stars_from_rating(rating: &serde_json::Value) -> u8 {
    match rating {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(|v| (v as i64).clamp(1, 5) as u8)
            .unwrap_or(3),
        serde_json::Value::String(s) => {
            let s = s.to_lowercase();
            if s.contains("luxury") || s.contains('5') {
                5
            } else if s.contains("superior") || s.contains('4') {
                4
            } else if s.contains("standard") || s.contains('3') {
                3
            } else if s.contains("economy") || s.contains("budget") || s.contains('2') {
                2
            } else {
                3
            }
        }
        _ => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OfferKind, SourceType};

    fn offer(name: &str, city: &str) -> Offer {
        Offer::new(SourceType::Scraper, "traveloka", OfferKind::Hotel, name, city)
    }

    #[test]
    fn test_normalize_name_rules() {
        let n = Normalizer::new();
        assert_eq!(n.normalize_name("  The  Grand   Zam Zam Tower "), "grand zam zam tower");
        assert_eq!(n.normalize_name("Hotel Pullman ZamZam Makkah"), "pullman zamzam");
        assert_eq!(n.normalize_name("فندق الهلتون مكة"), "hilton");
        assert_eq!(n.normalize_name("Al Safwah Royale Orchid Hotel"), "safwah royale orchid");
        assert_eq!(n.normalize_name("Swissôtel (Al Maqam)!"), "swissôtel al maqam");
        assert_eq!(n.normalize_name(""), "");
    }

    #[test]
    fn test_normalize_name_idempotent_on_hidden_affixes() {
        let n = Normalizer::new();
        let once = n.normalize_name("Hotel. The Hilton Suites, Makkah");
        assert_eq!(once, "hilton suites");
        assert_eq!(n.normalize_name("The Hilton Hotel."), "hilton");
        assert_eq!(n.normalize_name(&once), once);
    }

    #[test]
    fn test_normalize_city() {
        let n = Normalizer::new();
        assert_eq!(n.normalize_city("mecca"), "Makkah");
        assert_eq!(n.normalize_city(" MEKKA "), "Makkah");
        assert_eq!(n.normalize_city("مكة"), "Makkah");
        assert_eq!(n.normalize_city("Medina"), "Madinah");
        assert_eq!(n.normalize_city("jidda"), "Jeddah");
        assert_eq!(n.normalize_city("kuala lumpur"), "Kuala Lumpur");
        assert_eq!(n.normalize_city(""), "");
    }

    #[test]
    fn test_normalize_fills_currency_and_hash() {
        let n = Normalizer::new();
        let out = n.normalize(offer("Hilton Suites", "mecca").with_price_sar(400.0).with_stars(9));
        assert_eq!(out.price_idr, Some(1_700_000.0));
        assert_eq!(out.stars, Some(5));
        assert_eq!(out.city, "Makkah");
        assert_eq!(out.hotel_chain.as_deref(), Some("Hilton"));
        assert_eq!(out.availability, AvailabilityStatus::Available);
        assert_eq!(out.offer_hash, out.compute_hash());
        assert!(!out.offer_hash.is_empty());
    }

    #[test]
    fn test_normalize_backfills_sar_from_idr() {
        let out = Normalizer::new().normalize(offer("Elaf Kinda", "Makkah").with_price_idr(1_500_000.0));
        assert_eq!(out.price_sar, Some(352.94));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = Normalizer::new();
        let mut sold_out = offer("Hotel Dar Al Tawhid InterContinental", "Makka");
        sold_out.is_available = false;
        let samples = vec![
            offer("  The Grand Zam Zam Tower  ", "mecca").with_price_idr(1_480_000.0),
            offer("فندق ماريوت المدينة", "المدينة").with_price_sar(520.0).with_stars(0),
            offer("Hotel. The Hilton Suites, Makkah", "jedda"),
            sold_out,
        ];
        for sample in samples {
            let once = n.normalize(sample);
            let twice = n.normalize(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_stars_from_rating() {
        assert_eq!(stars_from_rating(&serde_json::json!(4)), 4);
        assert_eq!(stars_from_rating(&serde_json::json!(7.0)), 5);
        assert_eq!(stars_from_rating(&serde_json::json!("Luxury")), 5);
        assert_eq!(stars_from_rating(&serde_json::json!("budget")), 2);
        assert_eq!(stars_from_rating(&serde_json::Value::Null), 3);
    }
}
