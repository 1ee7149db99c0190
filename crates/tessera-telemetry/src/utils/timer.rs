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

//! RAII timers that record into a histogram.

use crate::metrics::registry::HistogramHandle;
use tessera_core::Stopwatch;

/// Times a scope and records the elapsed milliseconds into a histogram on drop.
///
/// The sample is recorded on every exit path, including early returns via `?`.
pub struct ScopedMetricTimer<'a> {
    stopwatch: Stopwatch,
    histogram: &'a HistogramHandle,
}

impl<'a> ScopedMetricTimer<'a> {
    /// Starts timing immediately.
    pub fn new(histogram: &'a HistogramHandle) -> Self {
        Self {
            stopwatch: Stopwatch::start(),
            histogram,
        }
    }
}

impl Drop for ScopedMetricTimer<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.stopwatch.elapsed_secs_f64() * 1000.0;
        if let Err(e) = self.histogram.observe(elapsed_ms) {
            log::warn!("Telemetry: failed to record {}: {e}", self.histogram.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsRegistry;
    use std::time::Duration;
    use tessera_core::telemetry::MetricId;

    #[test]
    fn test_timer_records_on_drop() {
        let registry = MetricsRegistry::new();
        let histogram = registry
            .register_histogram(MetricId::new("test", "scope_ms"), "", "ms", vec![1.0, 100.0])
            .unwrap();

        {
            let _timer = ScopedMetricTimer::new(&histogram);
            std::thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(histogram.sample_count().unwrap(), 1);
        assert!(histogram.mean().unwrap().unwrap() >= 2.0);
    }
}
