//! Partner price feed workflow.
//!
//! Partners submit package prices which wait in `pending` until an admin
//! approves or rejects them. Only approved, current feeds reach search
//! results through the partner source.

mod validate;

pub use validate::{
    validate_request, ValidDates, MAX_DURATION_DAYS, MAX_PRICE_IDR, MIN_DURATION_DAYS,
    MIN_PRICE_IDR,
};

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::{
    idr_to_sar, Actor, FeedRequest, FeedStatus, FieldError, OfferKind, PartnerFeed,
};
use crate::repository::{OfferStore, StoreError};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Price feed not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSubmission {
    pub feed_id: String,
    pub status: FeedStatus,
}

/// Flat result shape for callers that report outcomes as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedResponse {
    pub success: bool,
    pub message: String,
    pub feed_id: Option<String>,
    pub errors: Vec<FieldError>,
}

impl FeedResponse {
    pub fn ok(message: impl Into<String>, feed_id: Option<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            feed_id,
            errors: Vec::new(),
        }
    }

    /// Turn a workflow result into the flat shape.
    pub fn from_result<T>(result: Result<T, FeedError>, message: &str, feed_id: Option<String>) -> Self {
        match result {
            Ok(_) => Self::ok(message, feed_id),
            Err(FeedError::Validation(errors)) => Self {
                success: false,
                message: "Validation failed".to_string(),
                feed_id,
                errors,
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
                feed_id,
                errors: Vec::new(),
            },
        }
    }
}

/// Submission, maintenance and review of partner feeds.
pub struct PartnerFeedService {
    store: Arc<dyn OfferStore>,
}

impl PartnerFeedService {
    pub fn new(store: Arc<dyn OfferStore>) -> Self {
        Self { store }
    }

    /// Validate and store a new feed as pending. Nothing is stored when
    /// validation fails.
    pub async fn submit_feed(
        &self,
        partner_id: &str,
        request: &FeedRequest,
    ) -> Result<FeedSubmission, FeedError> {
        let dates = validate_request(request).map_err(FeedError::Validation)?;

        let feed = PartnerFeed {
            id: uuid::Uuid::new_v4().to_string(),
            partner_id: partner_id.to_string(),
            feed_name: request.feed_name.trim().to_string(),
            feed_kind: request.feed_kind.unwrap_or(OfferKind::Package),
            price_idr: request.price_idr,
            price_sar: Some(idr_to_sar(request.price_idr)),
            price_per_person_idr: request.price_per_person_idr.or(Some(request.price_idr)),
            package_name: package_name(request),
            description: request.description.clone(),
            hotel_makkah: request.hotel_makkah.clone(),
            hotel_makkah_stars: request.hotel_makkah_stars,
            hotel_madinah: request.hotel_madinah.clone(),
            hotel_madinah_stars: request.hotel_madinah_stars,
            duration_days: request.duration_days,
            departure_city: request.departure_city.clone(),
            departure_dates: request.departure_dates.clone(),
            airline: request.airline.clone(),
            flight_class: request
                .flight_class
                .clone()
                .unwrap_or_else(|| "economy".to_string()),
            room_type: request.room_type.clone().unwrap_or_else(|| "quad".to_string()),
            inclusions: request.inclusions.clone(),
            exclusions: request.exclusions.clone(),
            quota: request.quota,
            booked: 0,
            is_available: true,
            valid_from: dates.valid_from,
            valid_until: dates.valid_until,
            commission_rate: 0.0,
            status: FeedStatus::Pending,
            submitted_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            rejection_reason: None,
        };
        self.store.insert_feed(&feed).await?;

        info!("Partner {} submitted price feed {}", partner_id, feed.id);
        Ok(FeedSubmission {
            feed_id: feed.id,
            status: FeedStatus::Pending,
        })
    }

    /// Replace the content of a pending feed owned by `partner_id`.
    pub async fn update_feed(
        &self,
        partner_id: &str,
        feed_id: &str,
        request: &FeedRequest,
    ) -> Result<PartnerFeed, FeedError> {
        let dates = validate_request(request).map_err(FeedError::Validation)?;
        let mut feed = self.owned_pending(partner_id, feed_id, "update").await?;

        feed.feed_name = request.feed_name.trim().to_string();
        feed.package_name = package_name(request);
        feed.price_idr = request.price_idr;
        feed.price_sar = Some(idr_to_sar(request.price_idr));
        feed.price_per_person_idr = request.price_per_person_idr.or(Some(request.price_idr));
        feed.description = request.description.clone();
        feed.duration_days = request.duration_days;
        feed.departure_city = request.departure_city.clone();
        feed.departure_dates = request.departure_dates.clone();
        feed.hotel_makkah = request.hotel_makkah.clone();
        feed.hotel_makkah_stars = request.hotel_makkah_stars;
        feed.hotel_madinah = request.hotel_madinah.clone();
        feed.hotel_madinah_stars = request.hotel_madinah_stars;
        feed.airline = request.airline.clone();
        feed.inclusions = request.inclusions.clone();
        feed.exclusions = request.exclusions.clone();
        feed.quota = request.quota;
        if dates.valid_from.is_some() {
            feed.valid_from = dates.valid_from;
        }
        if dates.valid_until.is_some() {
            feed.valid_until = dates.valid_until;
        }

        if !self.store.update_feed(&feed, FeedStatus::Pending).await? {
            return Err(self.write_refused(feed_id, "update").await);
        }
        info!("Partner {} updated price feed {}", partner_id, feed_id);
        Ok(feed)
    }

    /// Delete a pending feed owned by `partner_id`.
    pub async fn delete_feed(&self, partner_id: &str, feed_id: &str) -> Result<(), FeedError> {
        self.owned_pending(partner_id, feed_id, "delete").await?;
        if !self.store.delete_feed(feed_id, FeedStatus::Pending).await? {
            return Err(self.write_refused(feed_id, "delete").await);
        }
        info!("Partner {} deleted price feed {}", partner_id, feed_id);
        Ok(())
    }

    /// A partner's feeds, newest first.
    pub async fn list_partner_feeds(
        &self,
        partner_id: &str,
        status: Option<FeedStatus>,
    ) -> Result<Vec<PartnerFeed>, FeedError> {
        Ok(self.store.list_feeds(Some(partner_id), status).await?)
    }

    /// A feed, visible only to its owner.
    pub async fn get_feed(&self, partner_id: &str, feed_id: &str) -> Result<PartnerFeed, FeedError> {
        match self.store.get_feed(feed_id).await? {
            Some(feed) if feed.partner_id == partner_id => Ok(feed),
            _ => Err(FeedError::NotFound(feed_id.to_string())),
        }
    }

    /// Feeds awaiting review, newest first.
    pub async fn pending_feeds(&self, limit: usize) -> Result<Vec<PartnerFeed>, FeedError> {
        let mut feeds = self.store.list_feeds(None, Some(FeedStatus::Pending)).await?;
        feeds.truncate(limit);
        Ok(feeds)
    }

    pub async fn approve_feed(&self, feed_id: &str, actor: &Actor) -> Result<PartnerFeed, FeedError> {
        let mut feed = self.reviewable(feed_id, actor).await?;
        feed.status = FeedStatus::Approved;
        feed.approved_at = Some(Utc::now());
        feed.approved_by = Some(actor.id.clone());
        if !self.store.update_feed(&feed, FeedStatus::Pending).await? {
            return Err(self.write_refused(feed_id, "approve").await);
        }

        info!("Price feed {} approved by {}", feed_id, actor.id);
        Ok(feed)
    }

    pub async fn reject_feed(
        &self,
        feed_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> Result<PartnerFeed, FeedError> {
        let mut feed = self.reviewable(feed_id, actor).await?;
        feed.status = FeedStatus::Rejected;
        feed.approved_at = Some(Utc::now());
        feed.approved_by = Some(actor.id.clone());
        feed.rejection_reason = Some(reason.to_string());
        if !self.store.update_feed(&feed, FeedStatus::Pending).await? {
            return Err(self.write_refused(feed_id, "reject").await);
        }

        info!("Price feed {} rejected by {}: {}", feed_id, actor.id, reason);
        Ok(feed)
    }

    async fn owned_pending(
        &self,
        partner_id: &str,
        feed_id: &str,
        action: &str,
    ) -> Result<PartnerFeed, FeedError> {
        let feed = self
            .store
            .get_feed(feed_id)
            .await?
            .ok_or_else(|| FeedError::NotFound(feed_id.to_string()))?;
        if feed.partner_id != partner_id {
            return Err(FeedError::Forbidden(format!(
                "Not authorized to {} this feed",
                action
            )));
        }
        match feed.status {
            FeedStatus::Pending => Ok(feed),
            status => Err(state_error(action, status)),
        }
    }

    async fn reviewable(&self, feed_id: &str, actor: &Actor) -> Result<PartnerFeed, FeedError> {
        if !actor.is_admin() {
            return Err(FeedError::Forbidden(
                "Only admins can review price feeds".to_string(),
            ));
        }
        let feed = self
            .store
            .get_feed(feed_id)
            .await?
            .ok_or_else(|| FeedError::NotFound(feed_id.to_string()))?;
        if feed.status != FeedStatus::Pending {
            return Err(state_error("review", feed.status));
        }
        Ok(feed)
    }

    /// Explain a conditional write that found the feed gone or no longer
    /// pending.
    async fn write_refused(&self, feed_id: &str, action: &str) -> FeedError {
        match self.store.get_feed(feed_id).await {
            Ok(Some(feed)) => state_error(action, feed.status),
            Ok(None) => FeedError::NotFound(feed_id.to_string()),
            Err(e) => e.into(),
        }
    }
}

fn state_error(action: &str, status: FeedStatus) -> FeedError {
    let message = match (action, status) {
        ("update", FeedStatus::Approved) => {
            "Cannot update approved feed. Submit a new one.".to_string()
        }
        ("review" | "approve" | "reject", status) => format!("Feed is already {}", status.as_str()),
        (action, status) => format!("Cannot {} {} feed", action, status.as_str()),
    };
    FeedError::InvalidState(message)
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn package_name(request: &FeedRequest) -> String {
    let name = request.package_name.trim();
    if name.is_empty() {
        request.feed_name.trim().to_string()
    } else {
        name.to_string()
    }
}
