//! Fetch results and the payload pushed to subscribers.

use std::collections::BTreeMap;

use crate::MetricRecord;

/// Outcome of fetching a single metric class.
///
/// On the wire this is either a JSON array of records or an object of the
/// form `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum MetricOutcome {
    /// Normalized records, in backend order.
    Records(Vec<MetricRecord>),

    /// The query for this metric failed.
    Failed {
        /// Human-readable failure description.
        error: String,
    },
}

impl MetricOutcome {
    /// Create a failed outcome.
    pub fn error(message: impl Into<String>) -> Self {
        MetricOutcome::Failed {
            error: message.into(),
        }
    }

    /// Check if this outcome is a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, MetricOutcome::Failed { .. })
    }

    /// Records, or `None` for a failed outcome.
    pub fn records(&self) -> Option<&[MetricRecord]> {
        match self {
            MetricOutcome::Records(records) => Some(records),
            MetricOutcome::Failed { .. } => None,
        }
    }

    /// Error message, or `None` for a successful outcome.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            MetricOutcome::Records(_) => None,
            MetricOutcome::Failed { error } => Some(error),
        }
    }
}

impl Default for MetricOutcome {
    fn default() -> Self {
        MetricOutcome::Records(Vec::new())
    }
}

/// Result of one collection cycle: metric name to outcome.
///
/// Every requested name is present, whether its query succeeded or not.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FetchResult {
    entries: BTreeMap<String, MetricOutcome>,
}

impl FetchResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for a metric, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, outcome: MetricOutcome) {
        self.entries.insert(name.into(), outcome);
    }

    /// Get the outcome for a metric.
    pub fn get(&self, name: &str) -> Option<&MetricOutcome> {
        self.entries.get(name)
    }

    /// Remove and return the outcome for a metric.
    pub fn remove(&mut self, name: &str) -> Option<MetricOutcome> {
        self.entries.remove(name)
    }

    /// Number of metrics in the result.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Metric names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over all outcomes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricOutcome)> {
        self.entries.iter()
    }

    /// Number of metrics whose query failed.
    pub fn error_count(&self) -> usize {
        self.entries.values().filter(|o| o.is_error()).count()
    }
}

impl FromIterator<(String, MetricOutcome)> for FetchResult {
    fn from_iter<T: IntoIterator<Item = (String, MetricOutcome)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FetchResult {
    type Item = (String, MetricOutcome);
    type IntoIter = std::collections::btree_map::IntoIter<String, MetricOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// The message pushed to every subscriber on each broadcast tick.
///
/// `statuses` carries the host up/down records, `metrics` the resource usage
/// classes. Both default to empty when nothing is cached yet.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BroadcastPayload {
    #[cfg_attr(feature = "serde", serde(default))]
    pub statuses: MetricOutcome,

    #[cfg_attr(feature = "serde", serde(default))]
    pub metrics: FetchResult,
}

impl BroadcastPayload {
    /// Merge the two cached snapshots into a payload.
    ///
    /// The status entry named `status_key` is lifted out of `status`; any
    /// other entries of the status snapshot are ignored.
    pub fn merge(status: Option<FetchResult>, metrics: Option<FetchResult>, status_key: &str) -> Self {
        let statuses = status
            .and_then(|mut s| s.remove(status_key))
            .unwrap_or_default();
        Self {
            statuses,
            metrics: metrics.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(instance: &str, value: f64) -> MetricRecord {
        MetricRecord {
            instance: Some(instance.to_string()),
            job: Some("node".to_string()),
            value: Some(value),
            timestamp: Some(1000.0),
        }
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = MetricOutcome::Records(vec![record("h1:9100", 1.0)]);
        assert!(!ok.is_error());
        assert_eq!(ok.records().map(<[_]>::len), Some(1));
        assert_eq!(ok.error_message(), None);

        let failed = MetricOutcome::error("boom");
        assert!(failed.is_error());
        assert!(failed.records().is_none());
        assert_eq!(failed.error_message(), Some("boom"));
    }

    #[test]
    fn test_fetch_result_counts() {
        let mut result = FetchResult::new();
        result.insert("status", MetricOutcome::Records(vec![]));
        result.insert("cpu_usage", MetricOutcome::error("timeout"));
        result.insert("memory_usage", MetricOutcome::error("timeout"));

        assert_eq!(result.len(), 3);
        assert_eq!(result.error_count(), 2);
        assert_eq!(
            result.names().collect::<Vec<_>>(),
            vec!["cpu_usage", "memory_usage", "status"]
        );
    }

    #[test]
    fn test_merge_with_empty_cache() {
        let payload = BroadcastPayload::merge(None, None, "status");
        assert_eq!(payload.statuses, MetricOutcome::Records(vec![]));
        assert!(payload.metrics.is_empty());
    }

    #[test]
    fn test_merge_lifts_status_entry() {
        let mut status = FetchResult::new();
        status.insert("status", MetricOutcome::Records(vec![record("h1:9100", 1.0)]));

        let mut metrics = FetchResult::new();
        metrics.insert("cpu_usage", MetricOutcome::Records(vec![record("h1:9100", 12.5)]));

        let payload = BroadcastPayload::merge(Some(status), Some(metrics.clone()), "status");
        assert_eq!(payload.statuses.records().unwrap()[0].value, Some(1.0));
        assert_eq!(payload.metrics, metrics);
    }

    #[test]
    fn test_merge_status_snapshot_without_status_key() {
        let mut status = FetchResult::new();
        status.insert("other", MetricOutcome::Records(vec![record("h1:9100", 1.0)]));

        let payload = BroadcastPayload::merge(Some(status), None, "status");
        assert_eq!(payload.statuses, MetricOutcome::default());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_fetch_result_wire_format() {
        let mut result = FetchResult::new();
        result.insert("status", MetricOutcome::Records(vec![record("h1:9100", 1.0)]));
        result.insert("disk_usage", MetricOutcome::error("Metric not found"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "disk_usage": {"error": "Metric not found"},
                "status": [{"instance": "h1:9100", "job": "node", "value": 1.0, "timestamp": 1000.0}]
            })
        );

        let back: FetchResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_empty_payload_wire_format() {
        let json = serde_json::to_string(&BroadcastPayload::default()).unwrap();
        assert_eq!(json, r#"{"statuses":[],"metrics":{}}"#);
    }
}
