//! Wiring of stores, sources and services from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::cache::{CacheManager, SourceCache};
use crate::config::{Config, Settings};
use crate::normalize::Deduplicator;
use crate::partner::PartnerFeedService;
use crate::rate_limit::RateLimiter;
use crate::repository::{OfferStore, SqliteStore};
use crate::scheduler::{register_default_jobs, JobContext, Scheduler};
use crate::sources::{
    ApiSource, DatabaseSource, DemoSource, OfferSource, PartnerSource, ScraperSource,
};

/// Everything a command or the daemon needs.
pub struct Services {
    pub store: Arc<dyn OfferStore>,
    pub aggregator: Arc<Aggregator>,
    pub partner: PartnerFeedService,
    pub scheduler: Scheduler,
}

impl Services {
    /// Open the SQLite database from `settings` and build on it.
    pub async fn open(settings: &Settings, config: &Config) -> anyhow::Result<Self> {
        settings.ensure_directories()?;
        let store = SqliteStore::new(&settings.database_path)?;
        debug!("Opened database {}", settings.database_path.display());
        Ok(Self::build(Arc::new(store), config).await)
    }

    /// Build services on top of an existing store.
    pub async fn build(store: Arc<dyn OfferStore>, config: &Config) -> Self {
        let sources = build_sources(store.clone(), config);
        let aggregator = Arc::new(
            Aggregator::new(store.clone(), config.aggregator.clone())
                .with_sources(sources)
                .with_deduplicator(Deduplicator::with_config(config.dedup.clone()))
                .with_cache(Arc::new(CacheManager::with_limits(
                    config.aggregator.cache_ttl(),
                    config.cache.max_entries,
                )))
                .with_source_cache(SourceCache::with_overrides(config.cache.source_ttls())),
        );

        let scheduler = Scheduler::new(Duration::from_secs(config.scheduler.poll_interval_secs));
        register_default_jobs(
            &scheduler,
            JobContext::new(aggregator.clone(), config.scheduler.stale_offer_days),
            &config.scheduler,
        )
        .await;

        Self {
            partner: PartnerFeedService::new(store.clone()),
            store,
            aggregator,
            scheduler,
        }
    }
}

/// Sources in query order: APIs, scrapers, partner feeds, demo data, then
/// the stored-offer fallback. Misconfigured sources are logged and left out.
pub fn build_sources(store: Arc<dyn OfferStore>, config: &Config) -> Vec<Arc<dyn OfferSource>> {
    let rate_limiter = RateLimiter::with_config(
        config.rate_limit.default.clone(),
        config.rate_limit.sources.clone(),
    );
    let mut sources: Vec<Arc<dyn OfferSource>> = Vec::new();

    for api in config.sources.api.iter().filter(|a| a.enabled) {
        match ApiSource::new(api, &config.http, rate_limiter.clone()) {
            Ok(source) => sources.push(Arc::new(source)),
            Err(e) => warn!("Skipping API source {}: {}", api.provider.as_str(), e),
        }
    }

    for target in config.sources.scrapers.iter().filter(|t| t.enabled) {
        match ScraperSource::new(target.clone(), &config.http, rate_limiter.clone()) {
            Ok(source) => sources.push(Arc::new(source)),
            Err(e) => warn!("Skipping scraper {}: {}", target.name, e),
        }
    }

    if config.sources.partner {
        sources.push(Arc::new(PartnerSource::new(store.clone())));
    }
    if config.sources.demo {
        sources.push(Arc::new(DemoSource::new()));
    }
    if config.sources.database_fallback {
        sources.push(Arc::new(DatabaseSource::new(store)));
    }
    sources
}
