//! # hostwatch-adapters
//!
//! Adapters for pulling host health and resource usage metrics out of
//! monitoring backends and converting them to hostwatch records.
//!
//! ## Supported Backends
//!
//! - **Prometheus** (`prometheus` feature, default) - Runs instant queries via
//!   the HTTP API (`/api/v1/query`) with bounded retry and backoff
//!
//! ## Quick Start (Prometheus)
//!
//! ```rust,no_run
//! use hostwatch_adapters::prometheus::{format_series, PrometheusClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PrometheusClient::builder()
//!         .endpoint("http://localhost:9090")
//!         .build()?;
//!
//!     let series = client.query_series("up").await?;
//!     for point in &series {
//!         let record = format_series(point);
//!         println!("{:?} -> {:?}", record.instance, record.value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;

#[cfg(feature = "prometheus")]
pub mod prometheus;

pub use error::{ErrorKind, QueryError};

// Re-export types for convenience
pub use hostwatch_types::{FetchResult, MetricOutcome, MetricRecord, RawSeriesPoint};
