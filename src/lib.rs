//! # hostwatch
//!
//! A host health dashboard backend. Polls a Prometheus server for host
//! up/down status and resource usage, caches the latest snapshots, and
//! streams them to WebSocket subscribers.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   query   ┌──────────┐  put   ┌───────┐  get   ┌───────────┐
//! │ Prometheus │◀──────────│ poller   │───────▶│ cache │◀───────│ broadcast │──▶ WebSocket
//! └────────────┘           │ (2 loops)│        └───────┘        │ (per sub) │
//!       ▲                  └──────────┘                         └───────────┘
//!       │ live query       ┌──────────┐
//!       └──────────────────│ server   │◀── /prometheus/{instances,hosts,metrics}
//!                          └──────────┘
//! ```
//!
//! - **[`fetcher`]**: one collection cycle over named queries, producing a
//!   [`FetchResult`](hostwatch_types::FetchResult)
//! - **[`poller`]**: periodic loops refreshing the cached snapshots
//! - **[`cache`]**: the snapshot store ([`cache::RedisCache`] or
//!   [`cache::MemoryCache`])
//! - **[`broadcast`]**: per-subscriber push loops and the subscriber registry
//! - **[`supervisor`]**: restart-on-panic ownership of background tasks and
//!   bounded shutdown
//! - **[`server`]**: axum routes
//!
//! ## Usage
//!
//! ```bash
//! hostwatch --config hostwatch.toml --listen 127.0.0.1:8000
//! ```
//!
//! ### As a library
//!
//! ```
//! use hostwatch::cache::MemoryCache;
//! use hostwatch::queries::STATUS;
//! use hostwatch::broadcast::build_payload;
//!
//! # tokio_test::block_on(async {
//! let cache = MemoryCache::new();
//! let payload = build_payload(&cache).await;
//! assert!(payload.statuses.records().unwrap().is_empty());
//! assert_eq!(STATUS, "status");
//! # });
//! ```

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod context;
pub mod fetcher;
pub mod logging;
pub mod poller;
pub mod queries;
pub mod server;
pub mod supervisor;

pub use context::AppContext;
pub use fetcher::{Fetcher, MetricSource};
pub use queries::{default_queries, QueryRegistry, QuerySpec};
