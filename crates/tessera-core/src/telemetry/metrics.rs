// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Metric identifiers, values and errors.

use std::fmt::{self, Display};
use std::time::Instant;

/// A structured metric identifier: `namespace:name[key=value,...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricId {
    /// Broad category, e.g. `session` or `device`.
    pub namespace: String,
    /// Metric name within the namespace.
    pub name: String,
    /// Dimension labels, kept sorted by key.
    pub labels: Vec<(String, String)>,
}

impl MetricId {
    /// Creates an unlabelled identifier.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: Vec::new(),
        }
    }

    /// Adds a label, keeping labels sorted so equal ids hash equally.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self.labels.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    /// Shorthand for the per-device form of a metric.
    pub fn for_device(namespace: impl Into<String>, name: impl Into<String>, device: usize) -> Self {
        Self::new(namespace, name).with_label("device", device.to_string())
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)?;
        if !self.labels.is_empty() {
            let labels = self
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "[{labels}]")?;
        }
        Ok(())
    }
}

/// The kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Monotonic count.
    Counter,
    /// Point-in-time value.
    Gauge,
    /// Distribution over fixed buckets.
    Histogram,
}

/// A metric's current value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Monotonic count.
    Counter(u64),
    /// Point-in-time value.
    Gauge(f64),
    /// Recorded samples and their bucket distribution.
    Histogram {
        /// Number of samples recorded so far.
        count: u64,
        /// Sum of every sample recorded so far.
        sum: f64,
        /// Inclusive upper bound of each bucket.
        bucket_bounds: Vec<f64>,
        /// Number of samples that fell into each bucket.
        bucket_counts: Vec<u64>,
    },
}

impl MetricValue {
    /// The [`MetricType`] of this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Histogram { .. } => MetricType::Histogram,
        }
    }

    /// Counter or gauge as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Counter(v) => Some(*v as f64),
            MetricValue::Gauge(v) => Some(*v),
            MetricValue::Histogram { .. } => None,
        }
    }

    /// The count, if this is a counter.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// The value, if this is a gauge.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            _ => None,
        }
    }

    /// Mean of the recorded samples, if this is a non-empty histogram.
    pub fn histogram_mean(&self) -> Option<f64> {
        match self {
            MetricValue::Histogram { count, sum, .. } if *count > 0 => Some(sum / *count as f64),
            _ => None,
        }
    }
}

/// Static description of a metric.
#[derive(Debug, Clone)]
pub struct MetricMetadata {
    /// The metric's identifier.
    pub id: MetricId,
    /// The metric's kind.
    pub metric_type: MetricType,
    /// What the metric measures.
    pub description: String,
    /// Unit of measurement, e.g. `ms` or `rows`.
    pub unit: String,
    /// When the metric was registered.
    pub created_at: Instant,
    /// When the metric was last written.
    pub last_updated: Instant,
}

impl MetricMetadata {
    /// Creates metadata stamped with the current time.
    pub fn new(
        id: MetricId,
        metric_type: MetricType,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            metric_type,
            description: description.into(),
            unit: unit.into(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Marks the metric as written now.
    pub fn touch(&mut self) {
        self.last_updated = Instant::now();
    }
}

/// A metric value together with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Static description.
    pub metadata: MetricMetadata,
    /// Current value.
    pub value: MetricValue,
}

impl Metric {
    /// A counter starting at `initial_value`.
    pub fn new_counter(id: MetricId, description: impl Into<String>, initial_value: u64) -> Self {
        Self {
            metadata: MetricMetadata::new(id, MetricType::Counter, description, "count"),
            value: MetricValue::Counter(initial_value),
        }
    }

    /// A gauge starting at `initial_value`.
    pub fn new_gauge(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        initial_value: f64,
    ) -> Self {
        Self {
            metadata: MetricMetadata::new(id, MetricType::Gauge, description, unit),
            value: MetricValue::Gauge(initial_value),
        }
    }

    /// An empty histogram over `bucket_bounds`.
    pub fn new_histogram(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        bucket_bounds: Vec<f64>,
    ) -> Self {
        let bucket_counts = vec![0; bucket_bounds.len()];
        Self {
            metadata: MetricMetadata::new(id, MetricType::Histogram, description, unit),
            value: MetricValue::Histogram {
                count: 0,
                sum: 0.0,
                bucket_bounds,
                bucket_counts,
            },
        }
    }
}

/// Result alias for metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors raised by the metrics layer.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// No metric is registered under the id.
    MetricNotFound(MetricId),
    /// The operation expected a different metric kind.
    TypeMismatch {
        /// Kind the operation needs.
        expected: MetricType,
        /// Kind actually stored.
        found: MetricType,
    },
    /// The storage backend failed.
    StorageError(String),
    /// The operation is not valid for the metric, e.g. unsorted buckets.
    InvalidOperation(String),
}

impl Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsError::MetricNotFound(id) => write!(f, "Metric not found: {id}"),
            MetricsError::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {expected:?}, found {found:?}")
            }
            MetricsError::StorageError(msg) => write!(f, "Storage error: {msg}"),
            MetricsError::InvalidOperation(msg) => write!(f, "Invalid operation: {msg}"),
        }
    }
}

impl std::error::Error for MetricsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_sorted_and_formatted() {
        let id = MetricId::new("device", "estimated_gpu_ms")
            .with_label("queue", "compute")
            .with_label("device", "1");

        assert_eq!(id.labels[0].0, "device");
        assert_eq!(id.to_string(), "device:estimated_gpu_ms[device=1,queue=compute]");
        assert_eq!(MetricId::new("session", "epochs").to_string(), "session:epochs");
    }

    #[test]
    fn test_for_device_matches_manual_label() {
        assert_eq!(
            MetricId::for_device("device", "workload_rows", 2),
            MetricId::new("device", "workload_rows").with_label("device", "2")
        );
    }

    #[test]
    fn test_value_accessors() {
        let counter = MetricValue::Counter(42);
        assert_eq!(counter.metric_type(), MetricType::Counter);
        assert_eq!(counter.as_counter(), Some(42));
        assert_eq!(counter.as_gauge(), None);
        assert_eq!(counter.as_f64(), Some(42.0));

        let gauge = MetricValue::Gauge(2.5);
        assert_eq!(gauge.as_gauge(), Some(2.5));

        let histogram = MetricValue::Histogram {
            count: 2,
            sum: 4.0,
            bucket_bounds: vec![2.0, 4.0],
            bucket_counts: vec![1, 1],
        };
        assert_eq!(histogram.as_f64(), None);
        assert_eq!(histogram.histogram_mean(), Some(2.0));
    }
}
