//! In-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{feed_is_listed, next_history_entry, OfferStore, Result};
use crate::models::{FeedStatus, Offer, PartnerFeed, PriceHistoryEntry, SearchFilters};

type OfferKey = (String, String, String);

#[derive(Debug, Default)]
struct MemoryState {
    offers: HashMap<String, Offer>,
    keys: HashMap<OfferKey, String>,
    history: HashMap<String, Vec<PriceHistoryEntry>>,
    next_history_id: i64,
    feeds: HashMap<String, PartnerFeed>,
}

/// Store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored offers.
    pub async fn offer_count(&self) -> usize {
        self.state.read().await.offers.len()
    }
}

fn offer_key(offer: &Offer) -> OfferKey {
    (
        offer.offer_hash.clone(),
        offer.source_name.clone(),
        offer.validity_key(),
    )
}

#[async_trait]
impl OfferStore for MemoryStore {
    async fn upsert(&self, offer: &Offer) -> Result<String> {
        let mut state = self.state.write().await;
        let key = offer_key(offer);

        if let Some(id) = state.keys.get(&key).cloned() {
            if let Some(stored) = state.offers.get_mut(&id) {
                stored.price_sar = offer.price_sar;
                stored.price_idr = offer.price_idr;
                stored.is_available = offer.is_available;
                stored.availability = offer.availability;
                stored.rooms_left = offer.rooms_left;
                stored.scraped_at = offer.scraped_at;
            }
            return Ok(id);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let mut stored = offer.clone();
        stored.id = Some(id.clone());
        state.offers.insert(id.clone(), stored);
        state.keys.insert(key, id.clone());
        Ok(id)
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Offer>> {
        let state = self.state.read().await;
        let mut offers: Vec<Offer> = state
            .offers
            .values()
            .filter(|o| filters.matches(o))
            .cloned()
            .collect();
        // HashMap order is arbitrary; settle ties by refresh time first.
        offers.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
        filters.sort_by.sort(&mut offers);
        offers.truncate(filters.limit);
        Ok(offers)
    }

    async fn record_history(
        &self,
        offer_id: &str,
        price_sar: f64,
        price_idr: f64,
        source: &str,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(offer) = state.offers.get(offer_id).cloned() else {
            return Ok(false);
        };

        state.next_history_id += 1;
        let id = state.next_history_id;
        let entries = state.history.entry(offer_id.to_string()).or_default();
        let mut entry =
            next_history_entry(entries.last(), &offer, offer_id, price_sar, price_idr, source);
        entry.id = id;
        entries.push(entry);
        Ok(true)
    }

    async fn approved_partner_feeds(&self, city: Option<&str>) -> Result<Vec<PartnerFeed>> {
        let today = Utc::now().date_naive();
        let state = self.state.read().await;
        let mut feeds: Vec<PartnerFeed> = state
            .feeds
            .values()
            .filter(|f| feed_is_listed(f, city, today))
            .cloned()
            .collect();
        feeds.sort_by(|a, b| a.price_idr.total_cmp(&b.price_idr));
        Ok(feeds)
    }

    async fn price_history(&self, offer_id: &str, limit: usize) -> Result<Vec<PriceHistoryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .get(offer_id)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_feed(&self, feed: &PartnerFeed) -> Result<()> {
        self.state
            .write()
            .await
            .feeds
            .insert(feed.id.clone(), feed.clone());
        Ok(())
    }

    async fn get_feed(&self, feed_id: &str) -> Result<Option<PartnerFeed>> {
        Ok(self.state.read().await.feeds.get(feed_id).cloned())
    }

    async fn update_feed(&self, feed: &PartnerFeed, expected: FeedStatus) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.feeds.get_mut(&feed.id) {
            Some(stored) if stored.status == expected => {
                *stored = feed.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_feed(&self, feed_id: &str, expected: FeedStatus) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.feeds.get(feed_id).is_some_and(|f| f.status == expected) {
            state.feeds.remove(feed_id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_feeds(
        &self,
        partner_id: Option<&str>,
        status: Option<FeedStatus>,
    ) -> Result<Vec<PartnerFeed>> {
        let state = self.state.read().await;
        let mut feeds: Vec<PartnerFeed> = state
            .feeds
            .values()
            .filter(|f| partner_id.map_or(true, |p| f.partner_id == p))
            .filter(|f| status.map_or(true, |s| f.status == s))
            .cloned()
            .collect();
        feeds.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(feeds)
    }

    async fn purge_stale(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().await;
        let stale: Vec<String> = state
            .offers
            .iter()
            .filter(|(_, o)| o.scraped_at < older_than)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            if let Some(offer) = state.offers.remove(id) {
                state.keys.remove(&offer_key(&offer));
            }
        }
        Ok(stale.len())
    }
}
