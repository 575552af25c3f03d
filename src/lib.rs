//! etfwatch backend library.
//!
//! Market-data ingestion and analytics for a curated watchlist of Korean
//! equities and ETFs: scheduled scraping into SQLite, derived analytics,
//! screener queries, alerts, and the REST facade over all of it.

pub mod alerts;
pub mod analytics;
pub mod api;
pub mod cache;
pub mod collector;
pub mod config;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod screener;
pub mod store;
pub mod upstream;

#[cfg(test)]
pub mod testutil;
