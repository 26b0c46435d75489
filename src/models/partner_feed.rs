//! Partner-submitted price feeds and their approval workflow.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::OfferKind;

/// Approval workflow state of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Pending,
    Approved,
    Rejected,
}

impl FeedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A partner's offer awaiting or past review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerFeed {
    pub id: String,
    pub partner_id: String,
    pub feed_name: String,
    pub feed_kind: OfferKind,

    pub price_idr: f64,
    pub price_sar: Option<f64>,
    pub price_per_person_idr: Option<f64>,

    pub package_name: String,
    pub description: Option<String>,
    pub hotel_makkah: Option<String>,
    pub hotel_makkah_stars: Option<u8>,
    pub hotel_madinah: Option<String>,
    pub hotel_madinah_stars: Option<u8>,
    pub duration_days: Option<u32>,
    pub departure_city: Option<String>,
    pub departure_dates: Vec<String>,
    pub airline: Option<String>,
    pub flight_class: String,
    pub room_type: String,
    pub inclusions: Vec<String>,
    pub exclusions: Vec<String>,

    pub quota: u32,
    pub booked: u32,
    pub is_available: bool,

    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    /// Commission percent agreed with the partner.
    pub commission_rate: f64,

    pub status: FeedStatus,
    pub submitted_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
}

impl PartnerFeed {
    /// Seats still bookable.
    pub fn remaining_quota(&self) -> u32 {
        self.quota.saturating_sub(self.booked)
    }

    /// Whether the feed is still inside its validity window on `today`.
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.valid_until.map(|until| until >= today).unwrap_or(true)
    }
}

/// Feed payload as submitted by a partner. Dates are `YYYY-MM-DD` strings
/// so malformed input can be reported per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedRequest {
    pub feed_name: String,
    pub feed_kind: Option<OfferKind>,
    pub price_idr: f64,
    pub price_per_person_idr: Option<f64>,
    pub package_name: String,
    pub description: Option<String>,
    pub hotel_makkah: Option<String>,
    pub hotel_makkah_stars: Option<u8>,
    pub hotel_madinah: Option<String>,
    pub hotel_madinah_stars: Option<u8>,
    pub duration_days: Option<u32>,
    pub departure_city: Option<String>,
    pub departure_dates: Vec<String>,
    pub airline: Option<String>,
    pub flight_class: Option<String>,
    pub room_type: Option<String>,
    pub inclusions: Vec<String>,
    pub exclusions: Vec<String>,
    pub quota: u32,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
}

/// Who is acting on a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Partner,
    Admin,
}

/// An authenticated caller of the partner workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
        }
    }

    pub fn partner(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Partner,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
