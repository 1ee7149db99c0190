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

//! The metrics a render session reports.

use crate::metrics::registry::{CounterHandle, GaugeHandle, HistogramHandle, MetricsRegistry};
use crate::utils::timer::ScopedMetricTimer;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tessera_core::telemetry::{MetricId, MetricsResult};
use tessera_core::TuningMode;

const FRAME_MS_BUCKETS: [f64; 8] = [1.0, 2.0, 4.0, 8.0, 16.0, 33.0, 66.0, 250.0];

/// Aggregate numbers for the end-of-session summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    /// Frames rendered.
    pub frames_rendered: u64,
    /// Epochs completed.
    pub epochs: u64,
    /// Proportional rebalances applied.
    pub rebalances: u64,
    /// Perturbation steps applied.
    pub perturbations: u64,
    /// Mean host-side frame time in milliseconds.
    pub mean_frame_ms: Option<f64>,
}

/// Session-level metrics registered once per session.
///
/// Recording never fails the render loop: metric errors are logged and dropped.
#[derive(Debug)]
pub struct SessionTelemetry {
    registry: MetricsRegistry,
    frames_rendered: CounterHandle,
    epochs: CounterHandle,
    rebalances: CounterHandle,
    perturbations: CounterHandle,
    duration_per_frame_ms: GaugeHandle,
    epoch_length: GaugeHandle,
    device_gpu_ms: Vec<GaugeHandle>,
    device_rows: Vec<GaugeHandle>,
    frame_ms: HistogramHandle,
}

impl SessionTelemetry {
    /// Registers the session metrics for `device_count` devices in a fresh registry.
    pub fn new(device_count: usize) -> MetricsResult<Self> {
        Self::with_registry(MetricsRegistry::new(), device_count)
    }

    /// Registers the session metrics in an existing registry.
    pub fn with_registry(registry: MetricsRegistry, device_count: usize) -> MetricsResult<Self> {
        let repartitions = |mode: TuningMode| {
            registry.register_counter(
                MetricId::new("session", "repartitions").with_label("mode", mode.as_str()),
                "Partitions changed by the tuner",
            )
        };

        let device_gpu_ms = (0..device_count)
            .map(|device| {
                registry.register_gauge(
                    MetricId::for_device("device", "estimated_gpu_ms", device),
                    "Estimated GPU-bound time per frame",
                    "ms",
                )
            })
            .collect::<MetricsResult<Vec<_>>>()?;
        let device_rows = (0..device_count)
            .map(|device| {
                registry.register_gauge(
                    MetricId::for_device("device", "workload_rows", device),
                    "Rows assigned to the device",
                    "rows",
                )
            })
            .collect::<MetricsResult<Vec<_>>>()?;

        Ok(Self {
            frames_rendered: registry.register_counter(
                MetricId::new("session", "frames_rendered"),
                "Frames rendered on every device",
            )?,
            epochs: registry
                .register_counter(MetricId::new("session", "epochs"), "Completed epochs")?,
            rebalances: repartitions(TuningMode::Rebalance)?,
            perturbations: repartitions(TuningMode::Perturb)?,
            duration_per_frame_ms: registry.register_gauge(
                MetricId::new("session", "duration_per_frame_ms"),
                "Average wall-clock frame time of the last epoch",
                "ms",
            )?,
            epoch_length: registry.register_gauge(
                MetricId::new("session", "epoch_length"),
                "Frames in the current epoch",
                "frames",
            )?,
            frame_ms: registry.register_histogram(
                MetricId::new("session", "frame_ms"),
                "Host-side frame time",
                "ms",
                FRAME_MS_BUCKETS.to_vec(),
            )?,
            device_gpu_ms,
            device_rows,
            registry,
        })
    }

    /// Starts timing one frame; the sample is recorded when the guard drops.
    pub fn frame_timer(&self) -> ScopedMetricTimer<'_> {
        ScopedMetricTimer::new(&self.frame_ms)
    }

    /// Counts one rendered frame.
    pub fn record_frame(&self) {
        log_failure(self.frames_rendered.increment());
    }

    /// Publishes the per-frame averages of a finished epoch.
    pub fn record_epoch(&self, duration_per_frame: Duration, estimated_gpu: &[Duration]) {
        log_failure(self.epochs.increment());
        log_failure(self.duration_per_frame_ms.set(millis(duration_per_frame)));
        for (gauge, duration) in self.device_gpu_ms.iter().zip(estimated_gpu) {
            log_failure(gauge.set(millis(*duration)));
        }
    }

    /// Publishes a measured but incomplete epoch without counting it.
    pub fn record_partial_epoch(&self, duration_per_frame: Duration, estimated_gpu: &[Duration]) {
        log_failure(self.duration_per_frame_ms.set(millis(duration_per_frame)));
        for (gauge, duration) in self.device_gpu_ms.iter().zip(estimated_gpu) {
            log_failure(gauge.set(millis(*duration)));
        }
    }

    /// Publishes the per-device workload.
    pub fn record_workload(&self, workload: &[u32]) {
        for (gauge, rows) in self.device_rows.iter().zip(workload) {
            log_failure(gauge.set(f64::from(*rows)));
        }
    }

    /// Publishes the length of the epoch about to start.
    pub fn record_epoch_length(&self, frames: u64) {
        log_failure(self.epoch_length.set(frames as f64));
    }

    /// Counts a tuner decision that changed the partition.
    pub fn record_repartition(&self, mode: TuningMode) {
        match mode {
            TuningMode::Rebalance => log_failure(self.rebalances.increment()),
            TuningMode::Perturb => log_failure(self.perturbations.increment()),
            TuningMode::Hold => {}
        }
    }

    /// Current aggregate numbers.
    pub fn summary(&self) -> TelemetrySummary {
        TelemetrySummary {
            frames_rendered: self.frames_rendered.get().unwrap_or(0),
            epochs: self.epochs.get().unwrap_or(0),
            rebalances: self.rebalances.get().unwrap_or(0),
            perturbations: self.perturbations.get().unwrap_or(0),
            mean_frame_ms: self.frame_ms.mean().ok().flatten(),
        }
    }

    /// Logs the summary at `info`.
    pub fn log_summary(&self) {
        let summary = self.summary();
        log::info!(
            "Telemetry: {} frames over {} epochs, {} rebalances, {} perturbations, mean frame {}",
            summary.frames_rendered,
            summary.epochs,
            summary.rebalances,
            summary.perturbations,
            summary
                .mean_frame_ms
                .map_or_else(|| "n/a".to_string(), |ms| format!("{ms:.3} ms"))
        );
    }

    /// The underlying registry.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

fn log_failure<T>(result: MetricsResult<T>) {
    if let Err(e) = result {
        log::warn!("Telemetry: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tessera_core::telemetry::MetricValue;

    #[test]
    fn test_registers_per_device_metrics() {
        let telemetry = SessionTelemetry::new(3).unwrap();
        let registry = telemetry.registry();
        assert_eq!(registry.namespace_metrics("device").len(), 6);
        assert!(registry.contains_metric(
            &MetricId::new("session", "repartitions").with_label("mode", "rebalance")
        ));
    }

    #[test]
    fn test_epoch_and_workload_gauges() {
        let telemetry = SessionTelemetry::new(2).unwrap();
        telemetry.record_epoch(
            Duration::from_millis(12),
            &[Duration::from_millis(4), Duration::from_millis(9)],
        );
        telemetry.record_workload(&[700, 380]);
        telemetry.record_epoch_length(450);

        let get = |id: MetricId| telemetry.registry().get_metric(&id).unwrap().value;
        assert_eq!(get(MetricId::new("session", "epochs")), MetricValue::Counter(1));
        assert_eq!(
            get(MetricId::new("session", "duration_per_frame_ms")),
            MetricValue::Gauge(12.0)
        );
        assert_eq!(
            get(MetricId::for_device("device", "estimated_gpu_ms", 1)),
            MetricValue::Gauge(9.0)
        );
        assert_eq!(
            get(MetricId::for_device("device", "workload_rows", 0)),
            MetricValue::Gauge(700.0)
        );
        assert_eq!(get(MetricId::new("session", "epoch_length")), MetricValue::Gauge(450.0));
    }

    #[test]
    fn test_summary_counts_modes_separately() {
        let telemetry = SessionTelemetry::new(2).unwrap();
        telemetry.record_repartition(TuningMode::Rebalance);
        telemetry.record_repartition(TuningMode::Perturb);
        telemetry.record_repartition(TuningMode::Perturb);
        telemetry.record_repartition(TuningMode::Hold);
        for _ in 0..3 {
            let _frame = telemetry.frame_timer();
            telemetry.record_frame();
        }
        telemetry.record_partial_epoch(Duration::from_millis(5), &[Duration::ZERO; 2]);

        let summary = telemetry.summary();
        assert_eq!(summary.frames_rendered, 3);
        assert_eq!(summary.epochs, 0);
        assert_eq!(summary.rebalances, 1);
        assert_eq!(summary.perturbations, 2);
        assert!(summary.mean_frame_ms.is_some());
    }

    #[test]
    fn test_frame_timer_cost_does_not_grow_with_session_length() {
        let telemetry = SessionTelemetry::new(2).unwrap();
        let time_frames = |frames: u32| {
            let start = Instant::now();
            for _ in 0..frames {
                drop(telemetry.frame_timer());
            }
            start.elapsed()
        };

        let early = time_frames(1_000);
        time_frames(200_000);
        let late = time_frames(1_000);

        assert!(
            late <= early * 10 + Duration::from_millis(20),
            "frame timer slowed from {early:?} to {late:?}"
        );
        assert_eq!(telemetry.frame_ms.sample_count().unwrap(), 202_000);
    }
}
