//! OTA result pages scraped with CSS selectors.

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{target_cities, to_sar, OfferSource, SourceError};
use crate::http_client::{HttpClient, HttpConfig};
use crate::models::{Offer, OfferKind, SearchFilters, SourceType};
use crate::normalize::stars_from_rating;
use crate::rate_limit::RateLimiter;

const DEFAULT_PRICE_PATTERN: &str = r"\d[\d.,]*";

/// Where and how to scrape one OTA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperTarget {
    pub name: String,
    /// Search page URL; `{city}`, `{check_in}` and `{check_out}` are filled in.
    pub search_url: String,
    /// One element per listed hotel.
    pub item_selector: String,
    pub name_selector: String,
    pub price_selector: String,
    #[serde(default)]
    pub stars_selector: Option<String>,
    #[serde(default)]
    pub link_selector: Option<String>,
    /// Currency prices are quoted in.
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub price_pattern: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_currency() -> String {
    "IDR".to_string()
}

fn default_true() -> bool {
    true
}

/// Source that scrapes an OTA search page. Every request goes through the
/// shared rate limiter.
pub struct ScraperSource {
    target: ScraperTarget,
    price_pattern: Regex,
    client: HttpClient,
}

impl ScraperSource {
    pub fn new(
        target: ScraperTarget,
        http: &HttpConfig,
        rate_limiter: RateLimiter,
    ) -> Result<Self, SourceError> {
        let selectors = [
            Some(&target.item_selector),
            Some(&target.name_selector),
            Some(&target.price_selector),
            target.stars_selector.as_ref(),
            target.link_selector.as_ref(),
        ];
        for selector in selectors.into_iter().flatten() {
            parse_selector(selector)?;
        }

        let pattern = target
            .price_pattern
            .as_deref()
            .unwrap_or(DEFAULT_PRICE_PATTERN);
        let price_pattern = Regex::new(pattern)
            .map_err(|e| SourceError::Config(format!("{}: bad price pattern: {}", target.name, e)))?;

        let client = HttpClient::new(&target.name, http)?.with_rate_limiter(rate_limiter);
        Ok(Self {
            target,
            price_pattern,
            client,
        })
    }

    fn search_url(&self, city: &str, filters: &SearchFilters) -> String {
        let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
        self.target
            .search_url
            .replace("{city}", &encode(city))
            .replace(
                "{check_in}",
                &filters.check_in.map(|d| d.to_string()).unwrap_or_default(),
            )
            .replace(
                "{check_out}",
                &filters.check_out.map(|d| d.to_string()).unwrap_or_default(),
            )
    }

    /// Extract offers from a results page.
    pub(crate) fn parse_listing(
        &self,
        html: &str,
        page_url: &str,
        city: &str,
    ) -> Result<Vec<Offer>, SourceError> {
        let target = &self.target;
        let item = parse_selector(&target.item_selector)?;
        let name = parse_selector(&target.name_selector)?;
        let price = parse_selector(&target.price_selector)?;
        let stars = target.stars_selector.as_deref().map(parse_selector).transpose()?;
        let link = target.link_selector.as_deref().map(parse_selector).transpose()?;
        let base = Url::parse(page_url).ok();

        let document = Html::parse_document(html);
        let mut offers = Vec::new();
        for element in document.select(&item) {
            let Some(hotel_name) = first_text(&element, &name) else {
                continue;
            };
            let Some(amount) = first_text(&element, &price).and_then(|t| self.parse_price(&t))
            else {
                debug!("{}: no price for {}", target.name, hotel_name);
                continue;
            };

            let mut offer = Offer::new(
                SourceType::Scraper,
                target.name.as_str(),
                OfferKind::Hotel,
                hotel_name,
                city,
            );
            if target.currency.eq_ignore_ascii_case("IDR") {
                offer.price_idr = Some(amount);
            } else {
                offer.price_sar = to_sar(amount, &target.currency);
            }
            offer.currency_original = target.currency.to_uppercase();
            offer.confidence = 0.8;
            offer.stars = stars
                .as_ref()
                .and_then(|s| element.select(s).next())
                .and_then(|e| star_count(&e));
            offer.source_url = link
                .as_ref()
                .and_then(|s| element.select(s).next())
                .and_then(|e| e.value().attr("href"))
                .and_then(|href| match &base {
                    Some(base) => base.join(href).ok().map(|u| u.to_string()),
                    None => Some(href.to_string()),
                });
            offers.push(offer);
        }
        Ok(offers)
    }

    /// Read a price, treating a trailing two-digit group as decimals.
    fn parse_price(&self, text: &str) -> Option<f64> {
        let raw = self.price_pattern.find(text)?.as_str();
        let (whole, decimals) = match raw.rfind(['.', ',']) {
            Some(pos) if raw.len() - pos == 3 => (&raw[..pos], &raw[pos + 1..]),
            _ => (raw, ""),
        };
        let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return None;
        }
        let value: f64 = format!("{}.{}", digits, if decimals.is_empty() { "0" } else { decimals })
            .parse()
            .ok()?;
        (value > 0.0).then_some(value)
    }
}

fn parse_selector(selector: &str) -> Result<Selector, SourceError> {
    Selector::parse(selector)
        .map_err(|e| SourceError::Config(format!("invalid selector `{}`: {}", selector, e)))
}

fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    let text = element
        .select(selector)
        .next()?
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Stars from a rating element: a `data-stars`/`aria-label` attribute, a run
/// of star glyphs, or descriptive text.
fn star_count(element: &ElementRef<'_>) -> Option<u8> {
    let attr = ["data-stars", "data-rating", "aria-label"]
        .iter()
        .find_map(|a| element.value().attr(a));
    let text = element.text().collect::<String>();
    let glyphs = text.chars().filter(|c| *c == '★').count();
    if glyphs > 0 {
        return Some(glyphs.min(5) as u8);
    }
    let source = attr.map(str::to_string).unwrap_or(text);
    let source = source.trim();
    if source.is_empty() {
        return None;
    }
    Some(stars_from_rating(&serde_json::Value::String(source.to_string())))
}

#[async_trait]
impl OfferSource for ScraperSource {
    fn name(&self) -> &str {
        &self.target.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Scraper
    }

    async fn fetch(&self, filters: &SearchFilters) -> Result<Vec<Offer>, SourceError> {
        let mut offers = Vec::new();
        for city in target_cities(filters) {
            let url = self.search_url(&city, filters);
            let html = self.client.get_text(&url, &[]).await?;
            let parsed = self.parse_listing(&html, &url, &city)?;
            if parsed.is_empty() {
                warn!("{}: no listings parsed from {}", self.target.name, url);
            }
            offers.extend(parsed);
        }
        info!("{} scraped {} offers", self.target.name, offers.len());
        Ok(offers)
    }
}
