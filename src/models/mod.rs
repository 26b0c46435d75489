//! Data models for umrahfare.

mod filters;
mod history;
mod offer;
mod partner_feed;

pub use filters::{FieldError, SearchFilters, SortBy, DEFAULT_LIMIT};
pub use history::{percent_change, PriceHistoryEntry, PriceTrend, TrendDirection};
pub use offer::{
    idr_to_sar, sar_to_idr, AvailabilityStatus, Offer, OfferKind, SourceType, SAR_TO_IDR,
};
pub use partner_feed::{Actor, FeedRequest, FeedStatus, PartnerFeed, Role};
