//! Raw and normalized metric types.

use std::collections::BTreeMap;

/// One element of an instant-vector query result, as the backend returns it.
///
/// Both fields are optional: a series may arrive without labels or without a
/// sample, and consumers are expected to degrade rather than fail.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawSeriesPoint {
    /// Label set of the series (`instance`, `job`, ...).
    #[cfg_attr(feature = "serde", serde(default))]
    pub metric: Option<BTreeMap<String, String>>,

    /// `[timestamp, value]` pair.
    #[cfg_attr(feature = "serde", serde(default))]
    pub value: Option<Vec<SampleValue>>,
}

impl RawSeriesPoint {
    /// Create a point from a label set and a `[timestamp, value]` sample.
    pub fn new<I, K, V>(labels: I, timestamp: f64, value: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            metric: Some(
                labels
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            value: Some(vec![
                SampleValue::Number(timestamp),
                SampleValue::Text(value.to_string()),
            ]),
        }
    }

    /// Look up a label value.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric.as_ref()?.get(name).map(String::as_str)
    }

    /// The sample element at `index` of the `[timestamp, value]` pair.
    pub fn sample(&self, index: usize) -> Option<&SampleValue> {
        self.value.as_ref()?.get(index)
    }
}

/// A single element of a sample pair.
///
/// Prometheus encodes timestamps as JSON numbers and sample values as strings
/// (so that `NaN` and `+Inf` survive JSON), but either form is accepted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SampleValue {
    Number(f64),
    Text(String),
    Null,
}

impl SampleValue {
    /// Interpret the element as a float, if possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Number(n) => Some(*n),
            SampleValue::Text(s) => s.trim().parse().ok(),
            SampleValue::Null => None,
        }
    }
}

/// Normalized, minimal form of a [`RawSeriesPoint`].
///
/// Every field is always present on the wire; missing data is `null`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricRecord {
    /// The `instance` label, typically `host:port`.
    pub instance: Option<String>,

    /// The `job` label.
    pub job: Option<String>,

    /// Sample value.
    pub value: Option<f64>,

    /// Sample timestamp in Unix seconds.
    pub timestamp: Option<f64>,
}
