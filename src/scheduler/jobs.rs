//! The built-in refresh and maintenance jobs.

use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{JobFuture, JobSchedule, Scheduler, SchedulerConfig};
use crate::aggregator::Aggregator;
use crate::models::{OfferKind, SearchFilters, SortBy, SourceType};
use crate::normalize::Normalizer;
use crate::repository::OfferStore;
use crate::sources::{feed_to_offer, PARTNER_SOURCE_NAME};

/// Offers considered per history snapshot.
const SNAPSHOT_LIMIT: usize = 500;

/// Shared handles the jobs operate on.
#[derive(Clone)]
pub struct JobContext {
    pub aggregator: Arc<Aggregator>,
    pub store: Arc<dyn OfferStore>,
    /// Cities refreshed by the source jobs.
    pub cities: Vec<String>,
    pub stale_offer_days: i64,
}

impl JobContext {
    pub fn new(aggregator: Arc<Aggregator>, stale_offer_days: i64) -> Self {
        Self {
            store: aggregator.store().clone(),
            aggregator,
            cities: vec!["Makkah".to_string(), "Madinah".to_string()],
            stale_offer_days,
        }
    }

    /// Names of configured sources of one type.
    fn source_names(&self, source_type: SourceType) -> Vec<String> {
        self.aggregator
            .sources()
            .iter()
            .filter(|s| s.source_type() == source_type)
            .map(|s| s.name().to_string())
            .collect()
    }
}

/// Register the five standard jobs with the schedules from `config`.
pub async fn register_default_jobs(
    scheduler: &Scheduler,
    context: JobContext,
    config: &SchedulerConfig,
) {
    let jobs: [(&str, &JobSchedule, fn(JobContext) -> JobFuture); 5] = [
        ("api_refresh", &config.api_refresh, |ctx| {
            refresh_sources(ctx, SourceType::Api).boxed()
        }),
        ("ota_scraping", &config.ota_scraping, |ctx| {
            refresh_sources(ctx, SourceType::Scraper).boxed()
        }),
        ("partner_sync", &config.partner_sync, |ctx| {
            partner_sync(ctx).boxed()
        }),
        ("cache_cleanup", &config.cache_cleanup, |ctx| {
            cache_cleanup(ctx).boxed()
        }),
        ("history_snapshot", &config.history_snapshot, |ctx| {
            history_snapshot(ctx).boxed()
        }),
    ];

    for (name, schedule, body) in jobs {
        let ctx = context.clone();
        scheduler
            .register_job(
                name,
                move || body(ctx.clone()),
                schedule.interval_hours,
                schedule.enabled,
            )
            .await;
    }
}

/// Force-refresh hotel offers for each city from every source of one type.
async fn refresh_sources(ctx: JobContext, source_type: SourceType) -> anyhow::Result<Value> {
    let names = ctx.source_names(source_type);
    if names.is_empty() {
        return Ok(json!({ "skipped": format!("no {} sources configured", source_type.as_str()) }));
    }

    let mut cities = Map::new();
    let mut errors = Vec::new();
    for city in &ctx.cities {
        let filters = SearchFilters::new()
            .city(city.as_str())
            .kind(OfferKind::Hotel)
            .sources(names.iter().cloned())
            .limit(SNAPSHOT_LIMIT)
            .force_refresh(true);
        match ctx.aggregator.aggregate(&filters).await {
            Ok(response) => {
                cities.insert(city.clone(), json!(response.total_found));
                errors.extend(
                    response
                        .errors
                        .into_iter()
                        .map(|f| format!("{}: {}", f.source, f.message)),
                );
            }
            Err(e) => {
                warn!("Refresh of {} failed: {}", city, e);
                errors.push(format!("{}: {}", city, e));
            }
        }
    }

    if cities.is_empty() {
        anyhow::bail!("{}", errors.join("; "));
    }
    Ok(json!({ "cities": cities, "errors": errors }))
}

/// Store every approved partner feed as an offer and record its price.
async fn partner_sync(ctx: JobContext) -> anyhow::Result<Value> {
    let feeds = ctx.store.approved_partner_feeds(None).await?;
    let normalizer = Normalizer::new();
    let mut synced = 0;
    for feed in &feeds {
        let offer = normalizer.normalize(feed_to_offer(feed));
        let id = ctx.store.upsert(&offer).await?;
        if let (Some(sar), Some(idr)) = (offer.price_sar, offer.effective_price_idr()) {
            ctx.store
                .record_history(&id, sar, idr, PARTNER_SOURCE_NAME)
                .await?;
        }
        synced += 1;
    }
    info!("Synced {} partner feeds", synced);
    Ok(json!({ "feeds": feeds.len(), "synced": synced }))
}

/// Drop expired cache entries and offers that stopped being refreshed.
async fn cache_cleanup(ctx: JobContext) -> anyhow::Result<Value> {
    let expired = ctx.aggregator.cleanup_caches();
    let cutoff = chrono::Utc::now() - chrono::Duration::days(ctx.stale_offer_days.max(1));
    let purged = ctx.store.purge_stale(cutoff).await?;
    Ok(json!({
        "expired_removed": expired,
        "stale_offers_purged": purged,
        "cache": ctx.aggregator.cache_stats(),
    }))
}

/// Append a history point for each stored, priced offer.
async fn history_snapshot(ctx: JobContext) -> anyhow::Result<Value> {
    let offers = ctx
        .store
        .search(&SearchFilters::new().sort_by(SortBy::Updated).limit(SNAPSHOT_LIMIT))
        .await?;

    let mut recorded = 0;
    for offer in &offers {
        let (Some(id), Some(sar), Some(idr)) =
            (offer.id.as_deref(), offer.price_sar, offer.effective_price_idr())
        else {
            continue;
        };
        if ctx
            .store
            .record_history(id, sar, idr, &offer.source_name)
            .await?
        {
            recorded += 1;
        }
    }
    Ok(json!({ "offers": offers.len(), "recorded": recorded }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorConfig;
    use crate::models::{Actor, FeedRequest, Offer};
    use crate::partner::PartnerFeedService;
    use crate::repository::MemoryStore;
    use crate::scheduler::JobStatus;
    use crate::sources::DemoSource;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryStore>, Scheduler) {
        let store = Arc::new(MemoryStore::new());
        let aggregator = Arc::new(
            Aggregator::new(store.clone(), AggregatorConfig::default())
                .with_source(Arc::new(DemoSource::new())),
        );
        let scheduler = Scheduler::new(Duration::from_secs(60));
        register_default_jobs(
            &scheduler,
            JobContext::new(aggregator, 7),
            &SchedulerConfig::default(),
        )
        .await;
        (store, scheduler)
    }

    #[tokio::test]
    async fn test_default_jobs_registered() {
        let (_, scheduler) = setup().await;
        let names: Vec<_> = scheduler
            .list_jobs()
            .await
            .into_iter()
            .map(|j| (j.name, j.interval_hours))
            .collect();
        assert_eq!(
            names,
            vec![
                ("api_refresh".to_string(), 2.0),
                ("cache_cleanup".to_string(), 4.0),
                ("history_snapshot".to_string(), 4.0),
                ("ota_scraping".to_string(), 6.0),
                ("partner_sync".to_string(), 1.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_api_refresh_without_api_sources_is_a_noop() {
        let (_, scheduler) = setup().await;
        let run = scheduler.run_job("api_refresh").await.unwrap();
        assert_eq!(run.status, JobStatus::Success);
        assert!(run.result.unwrap().get("skipped").is_some());
    }

    #[tokio::test]
    async fn test_partner_sync_stores_approved_feeds() {
        let (store, scheduler) = setup().await;
        let service = PartnerFeedService::new(store.clone());
        let submitted = service
            .submit_feed(
                "partner-1",
                &FeedRequest {
                    feed_name: "Umrah Plus Turki".to_string(),
                    price_idr: 35_000_000.0,
                    departure_city: Some("Surabaya".to_string()),
                    quota: 40,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service
            .approve_feed(&submitted.feed_id, &Actor::admin("admin-1"))
            .await
            .unwrap();

        let run = scheduler.run_job("partner_sync").await.unwrap();
        assert_eq!(run.status, JobStatus::Success);
        assert_eq!(run.result.unwrap()["synced"], 1);
        assert_eq!(store.offer_count().await, 1);
    }

    #[tokio::test]
    async fn test_history_snapshot_records_stored_offers() {
        let (store, scheduler) = setup().await;
        let offer = Offer::new(SourceType::Api, "xotelo", OfferKind::Hotel, "Elaf Kinda", "Makkah")
            .with_price_idr(1_700_000.0)
            .with_price_sar(400.0);
        let id = store.upsert(&offer).await.unwrap();

        let run = scheduler.run_job("history_snapshot").await.unwrap();
        assert_eq!(run.result.unwrap()["recorded"], 1);
        assert_eq!(store.price_history(&id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_cleanup_reports_counts() {
        let (_, scheduler) = setup().await;
        let run = scheduler.run_job("cache_cleanup").await.unwrap();
        let result = run.result.unwrap();
        assert_eq!(result["expired_removed"], 0);
        assert_eq!(result["stale_offers_purged"], 0);
    }
}
