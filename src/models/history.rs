//! Price history entries and trend computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AvailabilityStatus;

/// Percent change inside which a price is considered stable.
pub const STABLE_BAND_PERCENT: f64 = 1.0;

/// A captured price point for a stored offer. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub id: i64,
    pub offer_id: String,
    pub price_sar: f64,
    pub price_idr: f64,
    pub availability: AvailabilityStatus,
    pub rooms_left: Option<u32>,
    pub source_name: String,
    /// SAR change from the previous entry for the same offer.
    pub change_sar: Option<f64>,
    /// Percent change from the previous entry for the same offer.
    pub change_percent: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Direction of the latest price movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Stable => "stable",
        }
    }

    /// Classify a percent change using the stability band.
    pub fn from_change(change_percent: f64) -> Self {
        if change_percent > STABLE_BAND_PERCENT {
            Self::Up
        } else if change_percent < -STABLE_BAND_PERCENT {
            Self::Down
        } else {
            Self::Stable
        }
    }
}

/// Price movement between the two most recent history entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTrend {
    pub direction: TrendDirection,
    pub change_percent: f64,
    pub change_amount_idr: f64,
    pub previous_price_idr: f64,
    pub recorded_at: DateTime<Utc>,
}

impl PriceTrend {
    /// Build a trend from the latest entry and the one before it.
    pub fn between(previous: &PriceHistoryEntry, latest: &PriceHistoryEntry) -> Self {
        let change_amount_idr = latest.price_idr - previous.price_idr;
        let change_percent = percent_change(previous.price_idr, latest.price_idr);
        Self {
            direction: TrendDirection::from_change(change_percent),
            change_percent,
            change_amount_idr,
            previous_price_idr: previous.price_idr,
            recorded_at: latest.recorded_at,
        }
    }
}

/// Percent change from `previous` to `current`, rounded to two decimals.
/// A non-positive previous price yields zero.
pub fn percent_change(previous: f64, current: f64) -> f64 {
    if previous <= 0.0 {
        return 0.0;
    }
    (((current - previous) / previous) * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(price_idr: f64) -> PriceHistoryEntry {
        PriceHistoryEntry {
            id: 0,
            offer_id: "o1".to_string(),
            price_sar: price_idr / 4250.0,
            price_idr,
            availability: AvailabilityStatus::Available,
            rooms_left: None,
            source_name: "xotelo".to_string(),
            change_sar: None,
            change_percent: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_trend_direction_band() {
        assert_eq!(TrendDirection::from_change(1.5), TrendDirection::Up);
        assert_eq!(TrendDirection::from_change(-1.5), TrendDirection::Down);
        assert_eq!(TrendDirection::from_change(1.0), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_change(-0.4), TrendDirection::Stable);
    }

    #[test]
    fn test_trend_between_entries() {
        let trend = PriceTrend::between(&entry(1_000_000.0), &entry(1_100_000.0));
        assert_eq!(trend.direction, TrendDirection::Up);
        assert_eq!(trend.change_percent, 10.0);
        assert_eq!(trend.change_amount_idr, 100_000.0);
        assert_eq!(trend.previous_price_idr, 1_000_000.0);
    }

    #[test]
    fn test_percent_change_zero_previous() {
        assert_eq!(percent_change(0.0, 500.0), 0.0);
    }
}
