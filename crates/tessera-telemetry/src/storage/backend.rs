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

//! The storage contract behind the metrics registry.

use std::fmt::Debug;
use tessera_core::telemetry::{
    Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult,
};

/// A thread-safe store of metrics keyed by [`MetricId`].
///
/// Implementors only provide the primitive operations; counter, gauge and
/// histogram updates are built on top of them.
pub trait MetricsBackend: Send + Sync + Debug + 'static {
    /// Inserts or replaces a metric.
    fn put_metric(&self, metric: Metric) -> MetricsResult<()>;

    /// Returns a copy of a metric.
    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric>;

    /// Returns `true` if a metric is stored under `id`.
    fn contains_metric(&self, id: &MetricId) -> bool;

    /// Returns a copy of every stored metric.
    fn list_all_metrics(&self) -> Vec<Metric>;

    /// Number of stored metrics.
    fn metric_count(&self) -> usize;

    /// Applies `update` to the metric stored under `id`, in place.
    fn update_metric(
        &self,
        id: &MetricId,
        update: &mut dyn FnMut(&mut Metric) -> MetricsResult<()>,
    ) -> MetricsResult<()>;

    /// Adds `delta` to a counter and returns the new count.
    fn increment_counter(&self, id: &MetricId, delta: u64) -> MetricsResult<u64> {
        let mut result = 0;
        self.update_metric(id, &mut |metric: &mut Metric| match metric.value {
            MetricValue::Counter(ref mut value) => {
                *value = value.saturating_add(delta);
                result = *value;
                metric.metadata.touch();
                Ok(())
            }
            ref other => Err(mismatch(MetricType::Counter, other)),
        })?;
        Ok(result)
    }

    /// Overwrites a gauge.
    fn set_gauge(&self, id: &MetricId, value: f64) -> MetricsResult<()> {
        self.update_metric(id, &mut |metric: &mut Metric| match metric.value {
            MetricValue::Gauge(ref mut current) => {
                *current = value;
                metric.metadata.touch();
                Ok(())
            }
            ref other => Err(mismatch(MetricType::Gauge, other)),
        })
    }

    /// Records one histogram sample.
    ///
    /// A sample lands in the first bucket whose upper bound is not below it;
    /// samples above every bound only count towards the total and the sum.
    fn record_histogram_sample(&self, id: &MetricId, sample: f64) -> MetricsResult<()> {
        self.update_metric(id, &mut |metric: &mut Metric| match metric.value {
            MetricValue::Histogram {
                ref mut count,
                ref mut sum,
                ref bucket_bounds,
                ref mut bucket_counts,
            } => {
                *count += 1;
                *sum += sample;
                if let Some(bucket) = bucket_bounds.iter().position(|&bound| sample <= bound) {
                    bucket_counts[bucket] += 1;
                }
                metric.metadata.touch();
                Ok(())
            }
            ref other => Err(mismatch(MetricType::Histogram, other)),
        })
    }
}

fn mismatch(expected: MetricType, found: &MetricValue) -> MetricsError {
    MetricsError::TypeMismatch {
        expected,
        found: found.metric_type(),
    }
}
