//! umrahfare - Umrah price aggregation.
//!
//! Collects hotel, flight and package offers from hotel APIs, travel agency
//! sites and partner-submitted feeds, then normalizes, deduplicates, ranks
//! and caches them. Prices are tracked over time so trends can be reported.

#![allow(clippy::should_implement_trait)]

pub mod aggregator;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod http_client;
pub mod models;
pub mod normalize;
pub mod partner;
pub mod rate_limit;
pub mod repository;
pub mod scheduler;
pub mod sources;
