//! Hotel price APIs returning JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{target_cities, to_sar, OfferSource, SourceError};
use crate::http_client::{HttpClient, HttpConfig};
use crate::models::{AvailabilityStatus, Offer, OfferKind, SearchFilters, SourceType};
use crate::normalize::stars_from_rating;
use crate::rate_limit::RateLimiter;

/// Hotel APIs with known payload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiProvider {
    Amadeus,
    Xotelo,
    Makcorps,
}

impl ApiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amadeus => "amadeus",
            Self::Xotelo => "xotelo",
            Self::Makcorps => "makcorps",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "amadeus" => Some(Self::Amadeus),
            "xotelo" => Some(Self::Xotelo),
            "makcorps" => Some(Self::Makcorps),
            _ => None,
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Amadeus => "https://test.api.amadeus.com/v3/shopping/hotel-offers",
            Self::Xotelo => "https://xotelo.p.rapidapi.com/search",
            Self::Makcorps => "https://api.makcorps.com/free/hotels",
        }
    }
}

/// Configuration of one API source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSourceConfig {
    pub provider: ApiProvider,
    /// Defaults to the provider name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ApiSourceConfig {
    pub fn new(provider: ApiProvider) -> Self {
        Self {
            provider,
            name: None,
            base_url: None,
            api_key_env: None,
            enabled: true,
        }
    }
}

/// Source backed by a hotel price API.
pub struct ApiSource {
    name: String,
    provider: ApiProvider,
    base_url: String,
    api_key: Option<String>,
    client: HttpClient,
}

impl ApiSource {
    pub fn new(
        config: &ApiSourceConfig,
        http: &HttpConfig,
        rate_limiter: RateLimiter,
    ) -> Result<Self, SourceError> {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| config.provider.as_str().to_string());
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());
        let client = HttpClient::new(&name, http)?.with_rate_limiter(rate_limiter);

        Ok(Self {
            provider: config.provider,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| config.provider.default_base_url().to_string()),
            api_key,
            client,
            name,
        })
    }

    /// Query parameters for one city, or `None` when the provider does not
    /// cover it.
    fn query(&self, city: &str, filters: &SearchFilters) -> Option<Vec<(&'static str, String)>> {
        let check_in = filters.check_in.map(|d| d.to_string()).unwrap_or_default();
        let check_out = filters.check_out.map(|d| d.to_string()).unwrap_or_default();
        let mut query = match self.provider {
            ApiProvider::Amadeus => vec![
                ("cityCode", amadeus_city_code(city)?.to_string()),
                ("checkInDate", check_in),
                ("checkOutDate", check_out),
                ("adults", "2".to_string()),
                ("currency", "SAR".to_string()),
            ],
            ApiProvider::Xotelo => vec![
                ("location", city.to_string()),
                ("checkin", check_in),
                ("checkout", check_out),
                ("adults", "2".to_string()),
            ],
            ApiProvider::Makcorps => vec![("city", city.to_string())],
        };
        query.retain(|(_, v)| !v.is_empty());
        if let Some(key) = &self.api_key {
            let param = match self.provider {
                ApiProvider::Amadeus => "access_token",
                ApiProvider::Xotelo => "rapidapi-key",
                ApiProvider::Makcorps => "api_key",
            };
            query.push((param, key.clone()));
        }
        Some(query)
    }
}

#[async_trait]
impl OfferSource for ApiSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Api
    }

    async fn fetch(&self, filters: &SearchFilters) -> Result<Vec<Offer>, SourceError> {
        let mut offers = Vec::new();
        for city in target_cities(filters) {
            let Some(query) = self.query(&city, filters) else {
                debug!("{}: no coverage for {}", self.name, city);
                continue;
            };
            let payload: Value = self.client.get_json(&self.base_url, &query).await?;
            let parsed = parse_payload(self.provider, &self.name, &city, &payload)?;
            debug!("{}: {} offers for {}", self.name, parsed.len(), city);
            offers.extend(parsed);
        }
        info!("{} returned {} offers", self.name, offers.len());
        Ok(offers)
    }
}

fn amadeus_city_code(city: &str) -> Option<&'static str> {
    match city.trim().to_lowercase().as_str() {
        "makkah" | "mecca" | "makka" | "mekkah" => Some("MKK"),
        "madinah" | "medina" | "madina" => Some("MED"),
        "jeddah" | "jedda" => Some("JED"),
        _ => None,
    }
}

/// Turn a provider payload into offers for `city`.
pub(crate) fn parse_payload(
    provider: ApiProvider,
    source_name: &str,
    city: &str,
    payload: &Value,
) -> Result<Vec<Offer>, SourceError> {
    let (key, parse): (&str, fn(&str, &str, &Value) -> Option<Offer>) = match provider {
        ApiProvider::Amadeus => ("data", parse_amadeus),
        ApiProvider::Xotelo => ("hotels", parse_xotelo),
        ApiProvider::Makcorps => ("hotels", parse_makcorps),
    };
    let items = match payload.get(key) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(_) => {
            return Err(SourceError::Parse(format!(
                "{}: `{}` is not an array",
                source_name, key
            )))
        }
    };
    Ok(items
        .iter()
        .filter_map(|item| parse(source_name, city, item))
        .collect())
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn hotel_offer(source_name: &str, city: &str, name: String, price_sar: f64) -> Offer {
    let mut offer = Offer::new(SourceType::Api, source_name, OfferKind::Hotel, name, city);
    offer.price_sar = Some(price_sar);
    offer.price_per_night_sar = Some(price_sar);
    offer.currency_original = "SAR".to_string();
    offer.confidence = 0.9;
    offer
}

fn parse_amadeus(source_name: &str, city: &str, item: &Value) -> Option<Offer> {
    let hotel = item.get("hotel")?;
    let name = text(hotel.get("name"))?;
    let price = item.get("offers")?.get(0)?.get("price")?;
    let currency = text(price.get("currency")).unwrap_or_else(|| "SAR".to_string());
    let amount = to_sar(number(price.get("total"))?, &currency)?;

    let mut offer = hotel_offer(source_name, city, name, amount);
    offer.source_offer_id = text(hotel.get("hotelId"));
    offer.stars = hotel.get("rating").map(stars_from_rating);
    offer.currency_original = currency;
    offer.availability = AvailabilityStatus::Available;
    Some(offer)
}

fn parse_xotelo(source_name: &str, city: &str, item: &Value) -> Option<Offer> {
    let name = text(item.get("name"))?;
    let currency = text(item.get("currency")).unwrap_or_else(|| "SAR".to_string());
    let amount = to_sar(number(item.get("price").or(item.get("min_price")))?, &currency)?;

    let mut offer = hotel_offer(source_name, city, name, amount);
    offer.source_offer_id = text(item.get("id"));
    offer.stars = Some(item.get("stars").map(stars_from_rating).unwrap_or(3));
    offer.currency_original = currency;
    if let Some(km) = number(item.get("distance")).filter(|km| *km > 0.0) {
        offer.distance_m = Some((km * 1000.0).round() as u32);
        offer.walking_minutes = Some((km * 15.0).round() as u32);
    }
    Some(offer)
}

fn parse_makcorps(source_name: &str, city: &str, item: &Value) -> Option<Offer> {
    let name = text(item.get("name"))?;
    let amount = number(item.get("price"))?;

    let mut offer = hotel_offer(source_name, city, name, amount);
    offer.source_offer_id = text(item.get("id"));
    offer.stars = Some(3);
    offer.confidence = 0.7;
    Some(offer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_amadeus_covers_hejaz_cities_only() {
        assert_eq!(amadeus_city_code("Mecca"), Some("MKK"));
        assert_eq!(amadeus_city_code(" Medina "), Some("MED"));
        assert_eq!(amadeus_city_code("jeddah"), Some("JED"));
        assert_eq!(amadeus_city_code("Jakarta"), None);

        let source = ApiSource::new(
            &ApiSourceConfig::new(ApiProvider::Amadeus),
            &HttpConfig::default(),
            RateLimiter::new(),
        )
        .unwrap();
        assert!(source.query("Jakarta", &SearchFilters::new()).is_none());
        let query = source.query("Makkah", &SearchFilters::new()).unwrap();
        assert!(query.contains(&("cityCode", "MKK".to_string())));
    }

    #[tokio::test]
    async fn test_amadeus_skips_uncovered_city() {
        let source = ApiSource::new(
            &ApiSourceConfig::new(ApiProvider::Amadeus),
            &HttpConfig::default(),
            RateLimiter::new(),
        )
        .unwrap();
        let offers = source
            .fetch(&SearchFilters::new().city("Jakarta"))
            .await
            .unwrap();
        assert!(offers.is_empty());
    }

    #[test]
    fn test_parse_amadeus_converts_currency() {
        let payload = json!({
            "data": [
                {
                    "hotel": {"hotelId": "MKKSWI", "name": "Swissotel Makkah", "rating": "5"},
                    "offers": [{"price": {"total": "200.00", "currency": "USD"}}]
                },
                {"hotel": {"name": "No Offers"}, "offers": []}
            ]
        });
        let offers = parse_payload(ApiProvider::Amadeus, "amadeus", "Makkah", &payload).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].price_sar, Some(750.0));
        assert_eq!(offers[0].stars, Some(5));
        assert_eq!(offers[0].source_offer_id.as_deref(), Some("MKKSWI"));
        assert_eq!(offers[0].currency_original, "USD");
    }

    #[test]
    fn test_parse_xotelo_distance() {
        let payload = json!({
            "hotels": [
                {"id": 7, "name": "Hilton Suites", "stars": 5, "price": 100, "currency": "EUR", "distance": 0.2},
                {"name": "", "price": 10}
            ]
        });
        let offers = parse_payload(ApiProvider::Xotelo, "xotelo", "Makkah", &payload).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].price_sar, Some(410.0));
        assert_eq!(offers[0].distance_m, Some(200));
        assert_eq!(offers[0].walking_minutes, Some(3));
        assert_eq!(offers[0].source_offer_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_parse_makcorps_defaults() {
        let payload = json!({"hotels": [{"id": "a1", "name": "Al Safwah", "price": "350"}]});
        let offers = parse_payload(ApiProvider::Makcorps, "makcorps", "Makkah", &payload).unwrap();
        assert_eq!(offers[0].stars, Some(3));
        assert_eq!(offers[0].price_sar, Some(350.0));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let payload = json!({"hotels": {"name": "x"}});
        assert!(parse_payload(ApiProvider::Xotelo, "xotelo", "Makkah", &payload).is_err());
        assert!(parse_payload(ApiProvider::Xotelo, "xotelo", "Makkah", &json!({}))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(ApiProvider::from_str("Amadeus"), Some(ApiProvider::Amadeus));
        assert_eq!(ApiProvider::from_str("booking"), None);
    }
}
