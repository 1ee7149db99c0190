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

//! The default backend: a `RwLock<HashMap>` in process memory.

use crate::storage::backend::MetricsBackend;
use std::collections::HashMap;
use std::sync::RwLock;
use tessera_core::telemetry::{Metric, MetricId, MetricType, MetricsError, MetricsResult};

/// Stores every metric in memory behind a reader-writer lock.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: RwLock<HashMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every metric in `namespace`.
    pub fn metrics_in_namespace(&self, namespace: &str) -> Vec<Metric> {
        self.filtered(|metric| metric.metadata.id.namespace == namespace)
    }

    /// Copies of every metric of `metric_type`.
    pub fn metrics_of_type(&self, metric_type: MetricType) -> Vec<Metric> {
        self.filtered(|metric| metric.metadata.metric_type == metric_type)
    }

    fn filtered(&self, keep: impl Fn(&Metric) -> bool) -> Vec<Metric> {
        match self.storage.read() {
            Ok(storage) => storage.values().filter(|m| keep(m)).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl MetricsBackend for InMemoryBackend {
    fn put_metric(&self, metric: Metric) -> MetricsResult<()> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| MetricsError::StorageError("Failed to acquire write lock".to_string()))?;
        storage.insert(metric.metadata.id.clone(), metric);
        Ok(())
    }

    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        let storage = self
            .storage
            .read()
            .map_err(|_| MetricsError::StorageError("Failed to acquire read lock".to_string()))?;
        storage
            .get(id)
            .cloned()
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))
    }

    fn update_metric(
        &self,
        id: &MetricId,
        update: &mut dyn FnMut(&mut Metric) -> MetricsResult<()>,
    ) -> MetricsResult<()> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| MetricsError::StorageError("Failed to acquire write lock".to_string()))?;
        let metric = storage
            .get_mut(id)
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))?;
        update(metric)
    }

    fn contains_metric(&self, id: &MetricId) -> bool {
        self.storage
            .read()
            .map(|storage| storage.contains_key(id))
            .unwrap_or(false)
    }

    fn list_all_metrics(&self) -> Vec<Metric> {
        self.filtered(|_| true)
    }

    fn metric_count(&self) -> usize {
        self.storage.read().map(|storage| storage.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tessera_core::telemetry::MetricValue;

    #[test]
    fn test_counter_increments_saturate() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("session", "frames_rendered");
        backend
            .put_metric(Metric::new_counter(id.clone(), "frames", u64::MAX - 1))
            .unwrap();

        assert_eq!(backend.increment_counter(&id, 1).unwrap(), u64::MAX);
        assert_eq!(backend.increment_counter(&id, 10).unwrap(), u64::MAX);
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("session", "epoch_length");
        backend
            .put_metric(Metric::new_gauge(id.clone(), "frames per epoch", "frames", 100.0))
            .unwrap();

        let err = backend.increment_counter(&id, 1).unwrap_err();
        assert_eq!(
            err,
            MetricsError::TypeMismatch {
                expected: MetricType::Counter,
                found: MetricType::Gauge
            }
        );
    }

    #[test]
    fn test_histogram_buckets_are_exclusive() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("session", "frame_ms");
        backend
            .put_metric(Metric::new_histogram(id.clone(), "frame time", "ms", vec![1.0, 10.0]))
            .unwrap();

        for sample in [0.5, 1.0, 4.0, 25.0] {
            backend.record_histogram_sample(&id, sample).unwrap();
        }

        match backend.get_metric(&id).unwrap().value {
            MetricValue::Histogram {
                count,
                sum,
                bucket_counts,
                ..
            } => {
                assert_eq!(count, 4);
                assert_eq!(sum, 30.5);
                assert_eq!(bucket_counts, vec![2, 1]);
            }
            other => panic!("expected histogram, got {other:?}"),
        }
    }

    #[test]
    fn test_histogram_storage_stays_bounded() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("session", "frame_ms");
        backend
            .put_metric(Metric::new_histogram(id.clone(), "frame time", "ms", vec![1.0, 10.0]))
            .unwrap();

        let time_batch = || {
            let start = Instant::now();
            for _ in 0..1_000 {
                backend.record_histogram_sample(&id, 2.0).unwrap();
            }
            start.elapsed()
        };

        let early = time_batch();
        for _ in 0..200_000 {
            backend.record_histogram_sample(&id, 2.0).unwrap();
        }
        let late = time_batch();

        assert!(
            late <= early * 10 + Duration::from_millis(20),
            "recording slowed from {early:?} to {late:?}"
        );
        match backend.get_metric(&id).unwrap().value {
            MetricValue::Histogram {
                count,
                bucket_counts,
                ..
            } => {
                assert_eq!(count, 202_000);
                assert_eq!(bucket_counts, vec![0, 202_000]);
            }
            other => panic!("expected histogram, got {other:?}"),
        }
    }

    #[test]
    fn test_update_of_missing_metric_fails() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("session", "missing");
        assert_eq!(
            backend.set_gauge(&id, 1.0),
            Err(MetricsError::MetricNotFound(id))
        );
    }

    #[test]
    fn test_filters_by_namespace_and_type() {
        let backend = InMemoryBackend::new();
        backend
            .put_metric(Metric::new_counter(MetricId::new("session", "epochs"), "", 0))
            .unwrap();
        backend
            .put_metric(Metric::new_gauge(
                MetricId::for_device("device", "workload_rows", 0),
                "",
                "rows",
                0.0,
            ))
            .unwrap();

        assert_eq!(backend.metric_count(), 2);
        assert_eq!(backend.metrics_in_namespace("device").len(), 1);
        assert_eq!(backend.metrics_of_type(MetricType::Counter).len(), 1);
        assert!(!backend.contains_metric(&MetricId::new("device", "missing")));
    }
}
