//! Storage layer for offers, price history and partner feeds.
//!
//! Everything above this module talks to storage through [`OfferStore`].
//! Two implementations ship with the crate: [`MemoryStore`] for tests and
//! ephemeral runs, and [`SqliteStore`] for persistent installs.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::models::{
    percent_change, FeedStatus, Offer, PartnerFeed, PriceHistoryEntry, PriceTrend, SearchFilters,
};

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage task failed: {0}")]
    Task(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Narrow read/write contract the aggregator, partner workflow and jobs
/// rely on.
#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Insert or refresh an offer, returning its storage id.
    ///
    /// Offers conflict on `(offer_hash, source_name, validity date)`; a
    /// conflict only refreshes prices, availability and refresh time.
    async fn upsert(&self, offer: &Offer) -> Result<String>;

    /// Offers matching the filters, sorted and limited as requested.
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Offer>>;

    /// Append a price point for a stored offer. Returns false when the
    /// offer is unknown.
    async fn record_history(
        &self,
        offer_id: &str,
        price_sar: f64,
        price_idr: f64,
        source: &str,
    ) -> Result<bool>;

    /// Approved feeds still inside their validity window, optionally
    /// limited to one departure city.
    async fn approved_partner_feeds(&self, city: Option<&str>) -> Result<Vec<PartnerFeed>>;

    /// Most recent history entries for an offer, newest first.
    async fn price_history(&self, offer_id: &str, limit: usize) -> Result<Vec<PriceHistoryEntry>>;

    /// Movement between the two most recent history entries.
    async fn price_trend(&self, offer_id: &str) -> Result<Option<PriceTrend>> {
        let history = self.price_history(offer_id, 2).await?;
        Ok(match history.as_slice() {
            [latest, previous] => Some(PriceTrend::between(previous, latest)),
            _ => None,
        })
    }

    async fn insert_feed(&self, feed: &PartnerFeed) -> Result<()>;

    async fn get_feed(&self, feed_id: &str) -> Result<Option<PartnerFeed>>;

    /// Replace a stored feed if its stored status is still `expected`.
    /// Returns false when it does not exist or has moved on.
    async fn update_feed(&self, feed: &PartnerFeed, expected: FeedStatus) -> Result<bool>;

    /// Delete a feed if its stored status is still `expected`.
    async fn delete_feed(&self, feed_id: &str, expected: FeedStatus) -> Result<bool>;

    /// Feeds filtered by owner and status, newest submission first.
    async fn list_feeds(
        &self,
        partner_id: Option<&str>,
        status: Option<FeedStatus>,
    ) -> Result<Vec<PartnerFeed>>;

    /// Delete offers not refreshed since `older_than`, returning how many.
    async fn purge_stale(&self, older_than: DateTime<Utc>) -> Result<usize>;
}

/// Whether a feed belongs in the approved listing for `city` on `today`.
pub(crate) fn feed_is_listed(feed: &PartnerFeed, city: Option<&str>, today: NaiveDate) -> bool {
    feed.status == FeedStatus::Approved
        && feed.is_current(today)
        && city.map_or(true, |city| {
            feed.departure_city
                .as_deref()
                .is_some_and(|d| d.eq_ignore_ascii_case(city))
        })
}

/// Build the next history entry from the previous one for the same offer.
pub(crate) fn next_history_entry(
    previous: Option<&PriceHistoryEntry>,
    offer: &Offer,
    offer_id: &str,
    price_sar: f64,
    price_idr: f64,
    source: &str,
) -> PriceHistoryEntry {
    let (change_sar, change_percent) = match previous {
        Some(prev) => (
            Some(((price_sar - prev.price_sar) * 100.0).round() / 100.0),
            Some(percent_change(prev.price_idr, price_idr)),
        ),
        None => (None, None),
    };
    PriceHistoryEntry {
        id: previous.map(|p| p.id + 1).unwrap_or(1),
        offer_id: offer_id.to_string(),
        price_sar,
        price_idr,
        availability: offer.availability,
        rooms_left: offer.rooms_left,
        source_name: source.to_string(),
        change_sar,
        change_percent,
        recorded_at: Utc::now(),
    }
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
