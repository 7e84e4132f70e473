//! Restodash core - the data layer behind the restaurant dashboard.
//!
//! Reads go through a two-tier response cache and a deduplicating REST
//! client; writes invalidate what they touch. `RestaurantApi` exposes the
//! operations the dashboard screens need on top of that.

pub mod api;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod models;

pub use api::{ApiError, RequestClient, ReqwestTransport};
pub use cache::{FileStore, MemoryStore, TieredCache};
pub use config::Config;
pub use dashboard::{DashboardData, DashboardStats, RestaurantApi};
