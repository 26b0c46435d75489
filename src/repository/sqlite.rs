//! SQLite-backed store.
//!
//! Each operation opens its own connection on the blocking thread pool.
//! Offers and feeds keep their full record as JSON next to the columns that
//! queries and conflict handling need.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use super::{feed_is_listed, next_history_entry, parse_datetime, OfferStore, Result, StoreError};
use crate::models::{
    AvailabilityStatus, FeedStatus, Offer, PartnerFeed, PriceHistoryEntry,
    SearchFilters,
};
use crate::normalize::Normalizer;

/// SQLite-backed offer store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(&self) -> Result<()> {
        let conn = connect(&self.db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS offers (
                id TEXT PRIMARY KEY,
                offer_hash TEXT NOT NULL,
                source_name TEXT NOT NULL,
                source_type TEXT NOT NULL,
                kind TEXT NOT NULL,
                city TEXT NOT NULL,
                stars INTEGER,
                validity_date TEXT NOT NULL DEFAULT '',
                price_sar REAL,
                price_idr REAL,
                is_available INTEGER NOT NULL,
                availability TEXT NOT NULL,
                rooms_left INTEGER,
                record TEXT NOT NULL,
                scraped_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(offer_hash, source_name, validity_date)
            );
            CREATE INDEX IF NOT EXISTS idx_offers_city_kind ON offers(city, kind);
            CREATE INDEX IF NOT EXISTS idx_offers_scraped ON offers(scraped_at);

            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                offer_id TEXT NOT NULL,
                price_sar REAL NOT NULL,
                price_idr REAL NOT NULL,
                availability TEXT NOT NULL,
                rooms_left INTEGER,
                source_name TEXT NOT NULL,
                change_sar REAL,
                change_percent REAL,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_history_offer ON price_history(offer_id, id);

            CREATE TABLE IF NOT EXISTS partner_feeds (
                id TEXT PRIMARY KEY,
                partner_id TEXT NOT NULL,
                status TEXT NOT NULL,
                departure_city TEXT,
                valid_until TEXT,
                record TEXT NOT NULL,
                submitted_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_feeds_status ON partner_feeds(status);
        "#,
        )?;
        Ok(())
    }

    /// Run `f` with a fresh connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = connect(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(conn)
}

/// Rebuild an offer from its stored record, overlaying the columns that
/// upserts refresh.
fn offer_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<std::result::Result<Offer, serde_json::Error>> {
    let id: String = row.get("id")?;
    let record: String = row.get("record")?;
    let price_sar: Option<f64> = row.get("price_sar")?;
    let price_idr: Option<f64> = row.get("price_idr")?;
    let is_available: bool = row.get("is_available")?;
    let availability: String = row.get("availability")?;
    let rooms_left: Option<u32> = row.get("rooms_left")?;
    let scraped_at: String = row.get("scraped_at")?;

    Ok(serde_json::from_str::<Offer>(&record).map(|mut offer| {
        offer.id = Some(id);
        offer.price_sar = price_sar;
        offer.price_idr = price_idr;
        offer.is_available = is_available;
        offer.availability =
            AvailabilityStatus::from_str(&availability).unwrap_or(AvailabilityStatus::Unknown);
        offer.rooms_left = rooms_left;
        offer.scraped_at = parse_datetime(&scraped_at);
        offer
    }))
}

fn history_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PriceHistoryEntry> {
    Ok(PriceHistoryEntry {
        id: row.get("id")?,
        offer_id: row.get("offer_id")?,
        price_sar: row.get("price_sar")?,
        price_idr: row.get("price_idr")?,
        availability: AvailabilityStatus::from_str(&row.get::<_, String>("availability")?)
            .unwrap_or(AvailabilityStatus::Unknown),
        rooms_left: row.get("rooms_left")?,
        source_name: row.get("source_name")?,
        change_sar: row.get("change_sar")?,
        change_percent: row.get("change_percent")?,
        recorded_at: parse_datetime(&row.get::<_, String>("recorded_at")?),
    })
}

fn feeds_from_records(records: Vec<String>) -> Result<Vec<PartnerFeed>> {
    records
        .iter()
        .map(|r| serde_json::from_str(r).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl OfferStore for SqliteStore {
    async fn upsert(&self, offer: &Offer) -> Result<String> {
        let offer = offer.clone();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let record = serde_json::to_string(&offer)?;
            let id: String = conn.query_row(
                r#"
                INSERT INTO offers (
                    id, offer_hash, source_name, source_type, kind, city, stars,
                    validity_date, price_sar, price_idr, is_available, availability,
                    rooms_left, record, scraped_at, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
                ON CONFLICT(offer_hash, source_name, validity_date) DO UPDATE SET
                    price_sar = excluded.price_sar,
                    price_idr = excluded.price_idr,
                    is_available = excluded.is_available,
                    availability = excluded.availability,
                    rooms_left = excluded.rooms_left,
                    scraped_at = excluded.scraped_at,
                    updated_at = excluded.updated_at
                RETURNING id
                "#,
                params![
                    uuid::Uuid::new_v4().to_string(),
                    offer.offer_hash,
                    offer.source_name,
                    offer.source_type.as_str(),
                    offer.kind.as_str(),
                    offer.city,
                    offer.stars,
                    offer.validity_key(),
                    offer.price_sar,
                    offer.price_idr,
                    offer.is_available,
                    offer.availability.as_str(),
                    offer.rooms_left,
                    record,
                    offer.scraped_at.to_rfc3339(),
                    now,
                ],
                |row| row.get(0),
            )?;
            Ok(id)
        })
        .await
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Offer>> {
        let filters = filters.clone();
        self.with_conn(move |conn| {
            let mut sql = String::from("SELECT * FROM offers WHERE 1 = 1");
            let mut args: Vec<Value> = Vec::new();

            if let Some(city) = filters.city.as_deref().filter(|c| !c.trim().is_empty()) {
                sql.push_str(" AND city = ? COLLATE NOCASE");
                args.push(Value::Text(Normalizer::new().normalize_city(city)));
            }
            if let Some(kind) = filters.kind {
                sql.push_str(" AND kind = ?");
                args.push(Value::Text(kind.as_str().to_string()));
            }
            if let Some(min) = filters.min_price.filter(|p| *p > 0.0) {
                sql.push_str(" AND price_idr >= ?");
                args.push(Value::Real(min));
            }
            if let Some(max) = filters.max_price {
                sql.push_str(" AND price_idr > 0 AND price_idr <= ?");
                args.push(Value::Real(max));
            }
            if let Some(stars) = filters.min_stars.filter(|s| *s > 0) {
                sql.push_str(" AND stars >= ?");
                args.push(Value::Integer(i64::from(stars)));
            }
            sql.push_str(" ORDER BY scraped_at DESC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args), offer_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // Source, date and validity filters are applied on the decoded offer.
            let mut offers = rows
                .into_iter()
                .collect::<std::result::Result<Vec<Offer>, _>>()?
                .into_iter()
                .filter(|o| filters.matches(o))
                .collect::<Vec<_>>();
            filters.sort_by.sort(&mut offers);
            offers.truncate(filters.limit);
            Ok(offers)
        })
        .await
    }

    async fn record_history(
        &self,
        offer_id: &str,
        price_sar: f64,
        price_idr: f64,
        source: &str,
    ) -> Result<bool> {
        let offer_id = offer_id.to_string();
        let source = source.to_string();
        self.with_conn(move |conn| {
            let offer = conn
                .query_row(
                    "SELECT * FROM offers WHERE id = ?",
                    params![offer_id],
                    offer_from_row,
                )
                .optional()?
                .transpose()?;
            let Some(offer) = offer else {
                return Ok(false);
            };

            let previous = conn
                .query_row(
                    "SELECT * FROM price_history WHERE offer_id = ? ORDER BY id DESC LIMIT 1",
                    params![offer_id],
                    history_from_row,
                )
                .optional()?;
            let entry = next_history_entry(
                previous.as_ref(),
                &offer,
                &offer_id,
                price_sar,
                price_idr,
                &source,
            );

            conn.execute(
                r#"
                INSERT INTO price_history (
                    offer_id, price_sar, price_idr, availability, rooms_left,
                    source_name, change_sar, change_percent, recorded_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    entry.offer_id,
                    entry.price_sar,
                    entry.price_idr,
                    entry.availability.as_str(),
                    entry.rooms_left,
                    entry.source_name,
                    entry.change_sar,
                    entry.change_percent,
                    entry.recorded_at.to_rfc3339(),
                ],
            )?;
            Ok(true)
        })
        .await
    }

    async fn approved_partner_feeds(&self, city: Option<&str>) -> Result<Vec<PartnerFeed>> {
        let city = city.map(str::to_string);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT record FROM partner_feeds WHERE status = 'approved' ORDER BY submitted_at DESC",
            )?;
            let records = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let today = Utc::now().date_naive();
            let mut feeds: Vec<PartnerFeed> = feeds_from_records(records)?
                .into_iter()
                .filter(|f| feed_is_listed(f, city.as_deref(), today))
                .collect();
            feeds.sort_by(|a, b| a.price_idr.total_cmp(&b.price_idr));
            Ok(feeds)
        })
        .await
    }

    async fn price_history(&self, offer_id: &str, limit: usize) -> Result<Vec<PriceHistoryEntry>> {
        let offer_id = offer_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM price_history WHERE offer_id = ? ORDER BY id DESC LIMIT ?",
            )?;
            let entries = stmt
                .query_map(params![offer_id, limit as i64], history_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn insert_feed(&self, feed: &PartnerFeed) -> Result<()> {
        let feed = feed.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO partner_feeds (id, partner_id, status, departure_city, valid_until, record, submitted_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    feed.id,
                    feed.partner_id,
                    feed.status.as_str(),
                    feed.departure_city,
                    feed.valid_until.map(|d| d.to_string()),
                    serde_json::to_string(&feed)?,
                    feed.submitted_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_feed(&self, feed_id: &str) -> Result<Option<PartnerFeed>> {
        let feed_id = feed_id.to_string();
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    "SELECT record FROM partner_feeds WHERE id = ?",
                    params![feed_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(record
                .map(|r| serde_json::from_str::<PartnerFeed>(&r))
                .transpose()?)
        })
        .await
    }

    async fn update_feed(&self, feed: &PartnerFeed, expected: FeedStatus) -> Result<bool> {
        let feed = feed.clone();
        self.with_conn(move |conn| {
            let rows = conn.execute(
                r#"
                UPDATE partner_feeds
                SET status = ?2, departure_city = ?3, valid_until = ?4, record = ?5
                WHERE id = ?1 AND status = ?6
                "#,
                params![
                    feed.id,
                    feed.status.as_str(),
                    feed.departure_city,
                    feed.valid_until.map(|d| d.to_string()),
                    serde_json::to_string(&feed)?,
                    expected.as_str(),
                ],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn delete_feed(&self, feed_id: &str, expected: FeedStatus) -> Result<bool> {
        let feed_id = feed_id.to_string();
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "DELETE FROM partner_feeds WHERE id = ?1 AND status = ?2",
                params![feed_id, expected.as_str()],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn list_feeds(
        &self,
        partner_id: Option<&str>,
        status: Option<FeedStatus>,
    ) -> Result<Vec<PartnerFeed>> {
        let partner_id = partner_id.map(str::to_string);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT record FROM partner_feeds
                WHERE (?1 IS NULL OR partner_id = ?1) AND (?2 IS NULL OR status = ?2)
                ORDER BY submitted_at DESC
                "#,
            )?;
            let records = stmt
                .query_map(params![partner_id, status.map(|s| s.as_str())], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            feeds_from_records(records)
        })
        .await
    }

    async fn purge_stale(&self, older_than: DateTime<Utc>) -> Result<usize> {
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "DELETE FROM offers WHERE scraped_at < ?",
                params![older_than.to_rfc3339()],
            )?;
            debug!("Purged {} stale offers", rows);
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OfferKind, SourceType, TrendDirection};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(&dir.path().join("offers.db")).unwrap();
        (dir, store)
    }

    fn offer(source: &str, price: f64) -> Offer {
        let mut offer = Normalizer::new().normalize(
            Offer::new(SourceType::Scraper, source, OfferKind::Hotel, "Swissotel Makkah", "mecca")
                .with_stars(5)
                .with_price_idr(price),
        );
        offer.check_in = NaiveDate::from_ymd_opt(2026, 12, 1);
        offer
    }

    #[tokio::test]
    async fn test_upsert_returns_same_id_on_conflict() {
        let (_dir, store) = store();
        let first = store.upsert(&offer("tiket", 2_000_000.0)).await.unwrap();
        let second = store.upsert(&offer("tiket", 1_900_000.0)).await.unwrap();
        assert_eq!(first, second);

        let mut other_date = offer("tiket", 1_900_000.0);
        other_date.check_in = NaiveDate::from_ymd_opt(2026, 12, 2);
        let third = store.upsert(&other_date).await.unwrap();
        assert_ne!(first, third);

        let found = store
            .search(&SearchFilters::new().city("Makkah").min_stars(5))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|o| o.price_idr == Some(1_900_000.0)));
    }

    #[tokio::test]
    async fn test_search_filters_sources_and_price() {
        let (_dir, store) = store();
        store.upsert(&offer("tiket", 2_000_000.0)).await.unwrap();
        store.upsert(&offer("traveloka", 1_500_000.0)).await.unwrap();

        let cheap = store
            .search(&SearchFilters::new().price_range(None, Some(1_600_000.0)))
            .await
            .unwrap();
        assert_eq!(cheap.len(), 1);
        assert_eq!(cheap[0].source_name, "traveloka");

        let tiket = store
            .search(&SearchFilters::new().sources(["tiket"]))
            .await
            .unwrap();
        assert_eq!(tiket.len(), 1);
        assert_eq!(tiket[0].hotel_chain.as_deref(), Some("Swissôtel"));
    }

    #[tokio::test]
    async fn test_history_trend() {
        let (_dir, store) = store();
        let id = store.upsert(&offer("tiket", 2_000_000.0)).await.unwrap();
        store.record_history(&id, 470.59, 2_000_000.0, "tiket").await.unwrap();
        store.record_history(&id, 494.12, 2_100_000.0, "tiket").await.unwrap();

        let trend = store.price_trend(&id).await.unwrap().unwrap();
        assert_eq!(trend.direction, TrendDirection::Up);
        assert_eq!(trend.change_percent, 5.0);
        assert_eq!(store.price_history(&id, 10).await.unwrap()[1].change_percent, None);
        assert!(!store.record_history("nope", 1.0, 1.0, "tiket").await.unwrap());
    }

    #[tokio::test]
    async fn test_feed_round_trip_and_listing() {
        let (_dir, store) = store();
        let mut feed = PartnerFeed {
            id: "feed-1".to_string(),
            partner_id: "p1".to_string(),
            feed_name: "Umrah Hemat".to_string(),
            feed_kind: OfferKind::Package,
            price_idr: 28_000_000.0,
            price_sar: None,
            price_per_person_idr: None,
            package_name: "Umrah Hemat 9 Hari".to_string(),
            description: None,
            hotel_makkah: None,
            hotel_makkah_stars: Some(3),
            hotel_madinah: None,
            hotel_madinah_stars: Some(3),
            duration_days: Some(9),
            departure_city: Some("Surabaya".to_string()),
            departure_dates: Vec::new(),
            airline: None,
            flight_class: "economy".to_string(),
            room_type: "quad".to_string(),
            inclusions: Vec::new(),
            exclusions: Vec::new(),
            quota: 40,
            booked: 0,
            is_available: true,
            valid_from: None,
            valid_until: Some(Utc::now().date_naive() + chrono::Duration::days(30)),
            commission_rate: 10.0,
            status: FeedStatus::Pending,
            submitted_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            rejection_reason: None,
        };
        store.insert_feed(&feed).await.unwrap();
        assert!(store.approved_partner_feeds(None).await.unwrap().is_empty());

        feed.status = FeedStatus::Approved;
        assert!(store.update_feed(&feed, FeedStatus::Pending).await.unwrap());
        // Already approved, so a write expecting pending is refused.
        assert!(!store.update_feed(&feed, FeedStatus::Pending).await.unwrap());
        assert_eq!(store.approved_partner_feeds(Some("surabaya")).await.unwrap().len(), 1);
        assert!(store.approved_partner_feeds(Some("Jakarta")).await.unwrap().is_empty());

        let listed = store.list_feeds(Some("p1"), Some(FeedStatus::Approved)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(store.get_feed("feed-1").await.unwrap(), Some(feed));
        assert!(!store.delete_feed("feed-1", FeedStatus::Pending).await.unwrap());
        assert!(store.get_feed("feed-1").await.unwrap().is_some());
        assert!(store.delete_feed("feed-1", FeedStatus::Approved).await.unwrap());
        assert!(store.get_feed("feed-1").await.unwrap().is_none());
    }
}
