//! Multi-source offer aggregation.
//!
//! One query fans out to every configured source with bounded concurrency,
//! then the raw offers are normalized, deduplicated, filtered, sorted,
//! persisted and cached as a single [`AggregateResponse`].

mod response;

pub use response::{AggregateError, AggregateResponse, SourceFailure};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{cache_key, source_cache_key, CacheManager, CacheStats, SourceCache};
use crate::models::{Offer, OfferKind, SearchFilters, SortBy, SourceType};
use crate::normalize::{name_similarity, Deduplicator, Normalizer};
use crate::repository::OfferStore;
use crate::sources::OfferSource;

/// Minimum name overlap for an offer to count as the same hotel when
/// comparing sources.
const COMPARE_NAME_THRESHOLD: f64 = 0.5;

/// Aggregator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Lifetime of cached query responses, in seconds.
    pub cache_ttl_secs: u64,
    /// Sources queried at the same time.
    pub max_concurrency: usize,
    /// Hard limit on a single source call, in seconds.
    pub source_timeout_secs: u64,
    /// Write returned offers and their prices to storage.
    pub persist: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            max_concurrency: 3,
            source_timeout_secs: 45,
            persist: true,
        }
    }
}

impl AggregatorConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs.max(1))
    }
}

/// Position in the source list, source name, and what it returned.
type SourceResult = (usize, String, Result<Vec<Offer>, String>);

/// Raw results of querying a set of sources.
#[derive(Debug, Default)]
struct FetchOutcome {
    offers: Vec<Offer>,
    source_counts: BTreeMap<String, usize>,
    errors: Vec<SourceFailure>,
    attempted: usize,
}

impl FetchOutcome {
    fn merge(&mut self, other: FetchOutcome) {
        self.offers.extend(other.offers);
        self.source_counts.extend(other.source_counts);
        self.errors.extend(other.errors);
        self.attempted += other.attempted;
    }

    /// Drop offers from sources that returned live offers in this run;
    /// stored copies of those are older than what was just fetched.
    fn superseded_by(mut self, live: &BTreeMap<String, usize>) -> Self {
        let before = self.offers.len();
        self.offers
            .retain(|o| live.get(&o.source_name).map_or(true, |&count| count == 0));
        let dropped = before - self.offers.len();
        if dropped > 0 {
            debug!("Dropped {} stored offers superseded by live results", dropped);
        }
        self
    }

    fn all_failed(&self) -> bool {
        self.attempted > 0 && self.errors.len() == self.attempted
    }
}

/// Combines offers from every source into one ranked, cached answer.
pub struct Aggregator {
    sources: Vec<Arc<dyn OfferSource>>,
    normalizer: Normalizer,
    deduplicator: Deduplicator,
    cache: Arc<CacheManager<AggregateResponse>>,
    source_cache: SourceCache<Vec<Offer>>,
    store: Arc<dyn OfferStore>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(store: Arc<dyn OfferStore>, config: AggregatorConfig) -> Self {
        Self {
            sources: Vec::new(),
            normalizer: Normalizer::new(),
            deduplicator: Deduplicator::new(),
            cache: Arc::new(CacheManager::with_limits(
                config.cache_ttl(),
                crate::cache::DEFAULT_MAX_ENTRIES,
            )),
            source_cache: SourceCache::new(),
            store,
            config,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn OfferSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = Arc<dyn OfferSource>>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn with_deduplicator(mut self, deduplicator: Deduplicator) -> Self {
        self.deduplicator = deduplicator;
        self
    }

    /// Share a response cache, e.g. with the scheduler's cleanup job.
    pub fn with_cache(mut self, cache: Arc<CacheManager<AggregateResponse>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_source_cache(mut self, source_cache: SourceCache<Vec<Offer>>) -> Self {
        self.source_cache = source_cache;
        self
    }

    pub fn sources(&self) -> &[Arc<dyn OfferSource>] {
        &self.sources
    }

    pub fn store(&self) -> &Arc<dyn OfferStore> {
        &self.store
    }

    /// Run a query across all sources.
    pub async fn aggregate(
        &self,
        filters: &SearchFilters,
    ) -> Result<AggregateResponse, AggregateError> {
        let started = std::time::Instant::now();
        filters.validate().map_err(AggregateError::InvalidQuery)?;

        let key = cache_key(filters);
        if !filters.force_refresh {
            if let Some(mut cached) = self.cache.get(&key) {
                debug!("Cache hit for {}", key);
                cached.cache_hit = true;
                return Ok(cached);
            }
        }

        let primary: Vec<Arc<dyn OfferSource>> = self
            .sources
            .iter()
            .filter(|s| !s.is_fallback() && source_selected(s.name(), filters))
            .cloned()
            .collect();
        let mut outcome = self.fetch_all(&primary, filters).await;

        if outcome.offers.len() < filters.limit {
            let fallback: Vec<Arc<dyn OfferSource>> = self
                .sources
                .iter()
                .filter(|s| s.is_fallback())
                .cloned()
                .collect();
            if !fallback.is_empty() {
                debug!(
                    "{} raw offers below limit {}, consulting fallback sources",
                    outcome.offers.len(),
                    filters.limit
                );
                let stored = self.fetch_all(&fallback, filters).await;
                let stored = stored.superseded_by(&outcome.source_counts);
                outcome.merge(stored);
            }
        }

        if outcome.all_failed() {
            warn!("Every source failed for {}", key);
            return Err(AggregateError::AllSourcesFailed(outcome.errors));
        }

        let normalized: Vec<Offer> = outcome
            .offers
            .into_iter()
            .map(|o| self.normalizer.normalize(o))
            .collect();
        let mut offers: Vec<Offer> = self
            .deduplicator
            .deduplicate(normalized, true)
            .into_iter()
            .filter(|o| filters.matches(o))
            .collect();
        let total_found = offers.len();
        filters.sort_by.sort(&mut offers);
        offers.truncate(filters.limit);

        if self.config.persist {
            self.persist(&mut offers).await;
        }

        let response = AggregateResponse {
            total_found,
            total_returned: offers.len(),
            offers,
            source_counts: outcome.source_counts,
            cache_hit: false,
            errors: outcome.errors,
            aggregated_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
            filters: filters.clone(),
        };
        self.cache.set(key, response.clone(), Some(self.config.cache_ttl()));

        info!(
            "Aggregated {} of {} offers from {} sources in {}ms",
            response.total_returned,
            response.total_found,
            response.source_counts.len(),
            response.duration_ms
        );
        Ok(response)
    }

    /// Query sources concurrently, each under the source timeout.
    async fn fetch_all(
        &self,
        sources: &[Arc<dyn OfferSource>],
        filters: &SearchFilters,
    ) -> FetchOutcome {
        let key = source_cache_key(filters);
        let timeout = self.config.source_timeout();

        let pending: Vec<BoxFuture<'_, SourceResult>> = sources
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, source)| {
                let key = key.clone();
                async move {
                    let name = source.name().to_string();
                    let result = self.fetch_one(source.as_ref(), filters, &key, timeout).await;
                    (index, name, result)
                }
                .boxed()
            })
            .collect();
        let mut results: Vec<SourceResult> = stream::iter(pending)
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;
        // Completion order is arbitrary; keep configuration order.
        results.sort_by_key(|(index, _, _)| *index);

        let mut outcome = FetchOutcome {
            attempted: results.len(),
            ..Default::default()
        };
        for (_, name, result) in results {
            match result {
                Ok(offers) => {
                    outcome.source_counts.insert(name, offers.len());
                    outcome.offers.extend(offers);
                }
                Err(message) => {
                    warn!("Source {} failed: {}", name, message);
                    outcome.errors.push(SourceFailure {
                        source: name,
                        message,
                    });
                }
            }
        }
        outcome
    }

    async fn fetch_one(
        &self,
        source: &dyn OfferSource,
        filters: &SearchFilters,
        key: &str,
        timeout: Duration,
    ) -> Result<Vec<Offer>, String> {
        let name = source.name();
        let cacheable = source.source_type() != SourceType::Cache;

        if cacheable && !filters.force_refresh {
            if let Some(offers) = self.source_cache.get(name, key) {
                debug!("{}: {} offers from source cache", name, offers.len());
                return Ok(offers);
            }
        }

        match tokio::time::timeout(timeout, source.fetch(filters)).await {
            Ok(Ok(offers)) => {
                if cacheable {
                    self.source_cache
                        .set(name, source.source_type(), key, offers.clone());
                }
                Ok(offers)
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
        }
    }

    /// Store live offers and append a history point for each priced one.
    /// Offers read back from storage already carry an id and are skipped.
    async fn persist(&self, offers: &mut [Offer]) {
        for offer in offers.iter_mut().filter(|o| o.id.is_none()) {
            let id = match self.store.upsert(offer).await {
                Ok(id) => id,
                Err(e) => {
                    warn!("Failed to store offer {}: {}", offer.name, e);
                    continue;
                }
            };
            if let (Some(sar), Some(idr)) = (offer.price_sar, offer.effective_price_idr()) {
                if let Err(e) = self
                    .store
                    .record_history(&id, sar, idr, &offer.source_name)
                    .await
                {
                    warn!("Failed to record price history for {}: {}", id, e);
                }
            }
            offer.id = Some(id);
        }
    }

    /// Cheapest offers in a city.
    pub async fn cheapest(
        &self,
        city: &str,
        kind: Option<OfferKind>,
        limit: usize,
    ) -> Result<Vec<Offer>, AggregateError> {
        let mut filters = SearchFilters::new()
            .city(city)
            .sort_by(SortBy::Price)
            .limit(limit);
        filters.kind = kind;
        Ok(self.aggregate(&filters).await?.offers)
    }

    /// Offers for one hotel or package across sources, cheapest first per
    /// source.
    pub async fn compare_sources(
        &self,
        name: &str,
        city: &str,
    ) -> Result<BTreeMap<String, Vec<Offer>>, AggregateError> {
        let wanted = self.normalizer.normalize_name(name);
        let response = self.aggregate(&SearchFilters::new().city(city)).await?;

        let mut by_source: BTreeMap<String, Vec<Offer>> = BTreeMap::new();
        for offer in response.offers {
            if name_similarity(&wanted, &offer.name_normalized) >= COMPARE_NAME_THRESHOLD {
                by_source
                    .entry(offer.source_name.clone())
                    .or_default()
                    .push(offer);
            }
        }
        for offers in by_source.values_mut() {
            SortBy::Price.sort(offers);
        }
        Ok(by_source)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn source_cache_stats(&self) -> BTreeMap<String, CacheStats> {
        self.source_cache.stats()
    }

    /// Drop expired entries from both cache levels.
    pub fn cleanup_caches(&self) -> usize {
        self.cache.cleanup_expired() + self.source_cache.cleanup_expired()
    }

    /// Invalidate one source's cached results, or everything. Cached query
    /// responses are always dropped since they may include that source.
    pub fn invalidate(&self, source: Option<&str>) -> HashMap<&'static str, usize> {
        let sources = match source {
            Some(name) => self.source_cache.invalidate_source(name),
            None => self.source_cache.invalidate_all(),
        };
        let queries = self.cache.invalidate_all();
        HashMap::from([("queries", queries), ("sources", sources)])
    }
}

fn source_selected(name: &str, filters: &SearchFilters) -> bool {
    filters.sources.is_empty()
        || filters
            .sources
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(name))
}
