//! # hostwatch-types
//!
//! Core types for host health monitoring. This crate defines the shapes that
//! flow between the metrics backend, the collection loops, the snapshot cache
//! and the clients that subscribe to live updates.
//!
//! ## Design Goals
//!
//! - **Tolerant input**: Raw backend series may be partially labeled or lack a
//!   sample; normalization degrades to `null` fields instead of failing
//! - **Per-metric isolation**: A [`FetchResult`] carries either records or an
//!   error for each metric class, so one failing query never hides the others
//! - **Optional serialization**: Enable the `serde` feature for JSON support
//!
//! ## Features
//!
//! - `serde`: JSON serialization via serde, matching the wire format the
//!   Prometheus HTTP API produces and the format pushed to subscribers
//!
//! ## Example
//!
//! ```rust
//! use hostwatch_types::{FetchResult, MetricOutcome, MetricRecord};
//!
//! let mut result = FetchResult::new();
//! result.insert(
//!     "status",
//!     MetricOutcome::Records(vec![MetricRecord {
//!         instance: Some("web-1:9100".to_string()),
//!         job: Some("node".to_string()),
//!         value: Some(1.0),
//!         timestamp: Some(1_700_000_000.0),
//!     }]),
//! );
//! result.insert("cpu_usage", MetricOutcome::error("backend unavailable"));
//!
//! assert_eq!(result.len(), 2);
//! assert!(result.get("cpu_usage").unwrap().is_error());
//! ```

mod instance;
mod metrics;
mod snapshot;

pub use instance::*;
pub use metrics::*;
pub use snapshot::*;

/// Error message recorded for a requested metric that has no registered query.
pub const METRIC_NOT_FOUND: &str = "Metric not found";
