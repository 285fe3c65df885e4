//! Conversion of raw query results into metric records.

use hostwatch_types::{MetricRecord, RawSeriesPoint, SampleValue};

/// Normalize one series point.
///
/// Missing labels and missing or unparseable sample positions become `None`
/// instead of errors, so a partially labeled series never sinks a whole
/// metric class.
pub fn format_series(point: &RawSeriesPoint) -> MetricRecord {
    MetricRecord {
        instance: point.label("instance").map(str::to_string),
        job: point.label("job").map(str::to_string),
        value: point.sample(1).and_then(SampleValue::as_f64),
        timestamp: point.sample(0).and_then(SampleValue::as_f64),
    }
}

/// Normalize every point, preserving backend order.
pub fn format_all(points: &[RawSeriesPoint]) -> Vec<MetricRecord> {
    points.iter().map(format_series).collect()
}
