//! Registry of named backend queries.
//!
//! Each metric class the service knows about is a [`QuerySpec`]: a stable
//! name used as the key in fetch results, and the PromQL expression that
//! produces it. The registry is built once at startup and never mutated.

use std::collections::BTreeMap;

/// Host up/down, from the scrape health series.
pub const STATUS: &str = "status";
/// CPU busy percentage per instance.
pub const CPU_USAGE: &str = "cpu_usage";
/// Memory used percentage per instance.
pub const MEMORY_USAGE: &str = "memory_usage";
/// Filesystem used percentage per mount.
pub const DISK_USAGE: &str = "disk_usage";

/// Metric classes refreshed by the resource usage loop.
pub const RESOURCE_METRICS: [&str; 3] = [CPU_USAGE, MEMORY_USAGE, DISK_USAGE];

/// A named backend query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub name: String,
    pub expression: String,
}

impl QuerySpec {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// Immutable set of query specs, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct QueryRegistry {
    specs: BTreeMap<String, QuerySpec>,
}

impl QueryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a spec, replacing any previous spec with the same name.
    pub fn with(mut self, spec: QuerySpec) -> Self {
        self.specs.insert(spec.name.clone(), spec);
        self
    }

    /// Look up a spec by name.
    pub fn get(&self, name: &str) -> Option<&QuerySpec> {
        self.specs.get(name)
    }

    /// The expression registered for a name.
    pub fn expression(&self, name: &str) -> Option<&str> {
        self.get(name).map(|s| s.expression.as_str())
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// The node_exporter based queries served by default.
pub fn default_queries() -> QueryRegistry {
    QueryRegistry::new()
        .with(QuerySpec::new(STATUS, "up"))
        .with(QuerySpec::new(
            CPU_USAGE,
            "100 - (avg by (instance) (irate(node_cpu_seconds_total{mode='idle'}[5m])) * 100)",
        ))
        .with(QuerySpec::new(
            MEMORY_USAGE,
            "(node_memory_MemTotal_bytes - node_memory_MemAvailable_bytes) \
             / node_memory_MemTotal_bytes * 100",
        ))
        .with(QuerySpec::new(
            DISK_USAGE,
            "100 - (node_filesystem_avail_bytes{fstype!=\"tmpfs\", mountpoint!=\"/boot\"} * 100) \
             / node_filesystem_size_bytes{fstype!=\"tmpfs\", mountpoint!=\"/boot\"}",
        ))
}
