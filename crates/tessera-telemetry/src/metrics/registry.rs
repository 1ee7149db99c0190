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

//! Registry for creating metrics and handing out typed handles to them.

use crate::storage::{backend::MetricsBackend, memory_backend::InMemoryBackend};
use std::sync::Arc;
use tessera_core::telemetry::{Metric, MetricId, MetricType, MetricsError, MetricsResult};

/// Central entry point of the metrics system.
///
/// Registering a metric stores its initial value in the backend and returns a
/// handle that updates it without going through the registry again.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    backend: Arc<dyn MetricsBackend>,
}

impl MetricsRegistry {
    /// Creates a registry over a fresh [`InMemoryBackend`].
    pub fn new() -> Self {
        Self::with_backend(Arc::new(InMemoryBackend::new()))
    }

    /// Creates a registry over a custom backend.
    pub fn with_backend(backend: Arc<dyn MetricsBackend>) -> Self {
        Self { backend }
    }

    /// Registers a counter starting at zero.
    pub fn register_counter(
        &self,
        id: MetricId,
        description: impl Into<String>,
    ) -> MetricsResult<CounterHandle> {
        self.backend
            .put_metric(Metric::new_counter(id.clone(), description, 0))?;
        Ok(CounterHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Registers a gauge starting at zero.
    pub fn register_gauge(
        &self,
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> MetricsResult<GaugeHandle> {
        self.backend
            .put_metric(Metric::new_gauge(id.clone(), description, unit, 0.0))?;
        Ok(GaugeHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Registers an empty histogram. `buckets` must be sorted ascending.
    pub fn register_histogram(
        &self,
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        buckets: Vec<f64>,
    ) -> MetricsResult<HistogramHandle> {
        if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(MetricsError::InvalidOperation(format!(
                "histogram buckets for {id} must be strictly increasing"
            )));
        }
        self.backend
            .put_metric(Metric::new_histogram(id.clone(), description, unit, buckets))?;
        Ok(HistogramHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Returns a copy of a metric.
    pub fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.backend.get_metric(id)
    }

    /// Returns `true` if a metric is registered under `id`.
    pub fn contains_metric(&self, id: &MetricId) -> bool {
        self.backend.contains_metric(id)
    }

    /// Every metric in `namespace`.
    pub fn namespace_metrics(&self, namespace: &str) -> Vec<Metric> {
        self.backend
            .list_all_metrics()
            .into_iter()
            .filter(|m| m.metadata.id.namespace == namespace)
            .collect()
    }

    /// Number of registered metrics.
    pub fn metric_count(&self) -> usize {
        self.backend.metric_count()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered counter.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl CounterHandle {
    /// Adds one and returns the new count.
    pub fn increment(&self) -> MetricsResult<u64> {
        self.backend.increment_counter(&self.id, 1)
    }

    /// Adds `amount` and returns the new count.
    pub fn increment_by(&self, amount: u64) -> MetricsResult<u64> {
        self.backend.increment_counter(&self.id, amount)
    }

    /// Current count.
    pub fn get(&self) -> MetricsResult<u64> {
        let metric = self.backend.get_metric(&self.id)?;
        metric
            .value
            .as_counter()
            .ok_or_else(|| MetricsError::TypeMismatch {
                expected: MetricType::Counter,
                found: metric.value.metric_type(),
            })
    }

    /// The counter's id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle to a registered gauge.
#[derive(Debug, Clone)]
pub struct GaugeHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl GaugeHandle {
    /// Overwrites the gauge.
    pub fn set(&self, value: f64) -> MetricsResult<()> {
        self.backend.set_gauge(&self.id, value)
    }

    /// Current value.
    pub fn get(&self) -> MetricsResult<f64> {
        let metric = self.backend.get_metric(&self.id)?;
        metric
            .value
            .as_gauge()
            .ok_or_else(|| MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: metric.value.metric_type(),
            })
    }

    /// The gauge's id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle to a registered histogram.
#[derive(Debug, Clone)]
pub struct HistogramHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl HistogramHandle {
    /// Records one sample.
    pub fn observe(&self, value: f64) -> MetricsResult<()> {
        self.backend.record_histogram_sample(&self.id, value)
    }

    /// Mean of every recorded sample, or `None` before the first one.
    pub fn mean(&self) -> MetricsResult<Option<f64>> {
        Ok(self.backend.get_metric(&self.id)?.value.histogram_mean())
    }

    /// Number of recorded samples.
    pub fn sample_count(&self) -> MetricsResult<u64> {
        match self.backend.get_metric(&self.id)?.value {
            tessera_core::telemetry::MetricValue::Histogram { count, .. } => Ok(count),
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Histogram,
                found: other.metric_type(),
            }),
        }
    }

    /// The histogram's id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_handle_updates_registry() {
        let registry = MetricsRegistry::new();
        let counter = registry
            .register_counter(MetricId::new("session", "epochs"), "Completed epochs")
            .unwrap();

        assert_eq!(counter.increment().unwrap(), 1);
        assert_eq!(counter.increment_by(4).unwrap(), 5);
        assert_eq!(counter.get().unwrap(), 5);
        assert!(registry.contains_metric(counter.id()));
        assert_eq!(registry.metric_count(), 1);
    }

    #[test]
    fn test_gauge_handle_overwrites() {
        let registry = MetricsRegistry::new();
        let gauge = registry
            .register_gauge(
                MetricId::for_device("device", "workload_rows", 1),
                "Rows assigned",
                "rows",
            )
            .unwrap();

        gauge.set(360.0).unwrap();
        gauge.set(120.0).unwrap();
        assert_eq!(gauge.get().unwrap(), 120.0);
        assert_eq!(registry.namespace_metrics("device").len(), 1);
    }

    #[test]
    fn test_histogram_mean_and_count() {
        let registry = MetricsRegistry::new();
        let histogram = registry
            .register_histogram(
                MetricId::new("session", "frame_ms"),
                "Frame time",
                "ms",
                vec![1.0, 5.0, 10.0],
            )
            .unwrap();

        assert_eq!(histogram.mean().unwrap(), None);
        histogram.observe(2.0).unwrap();
        histogram.observe(6.0).unwrap();
        assert_eq!(histogram.mean().unwrap(), Some(4.0));
        assert_eq!(histogram.sample_count().unwrap(), 2);
    }

    #[test]
    fn test_unsorted_buckets_are_rejected() {
        let registry = MetricsRegistry::new();
        let err = registry
            .register_histogram(MetricId::new("session", "bad"), "", "ms", vec![5.0, 1.0])
            .unwrap_err();
        assert!(matches!(err, MetricsError::InvalidOperation(_)));
        assert_eq!(registry.metric_count(), 0);
    }
}
