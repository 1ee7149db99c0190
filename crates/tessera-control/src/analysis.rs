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

//! Load-imbalance analysis over per-device GPU durations.

use std::time::Duration;

/// Normalized variance above which devices are considered badly imbalanced.
pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 1.8;

/// The outcome of an imbalance analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImbalanceReport {
    /// Mean estimated GPU duration across devices, in nanoseconds.
    pub mean_nanos: f64,
    /// `Σ ((d - mean) / mean)²` over devices.
    pub variance: f64,
    /// `true` if `variance` exceeds the threshold.
    pub needs_rebalance: bool,
}

/// Computes the normalized variance of `durations`.
///
/// An empty slice or a zero mean reports zero variance: there is nothing to
/// rebalance against.
pub fn analyze_imbalance(durations: &[Duration], threshold: f64) -> ImbalanceReport {
    if durations.is_empty() {
        return ImbalanceReport {
            mean_nanos: 0.0,
            variance: 0.0,
            needs_rebalance: false,
        };
    }

    let nanos: Vec<f64> = durations.iter().map(|d| d.as_nanos() as f64).collect();
    let mean = nanos.iter().sum::<f64>() / nanos.len() as f64;
    let variance = if mean > 0.0 {
        nanos
            .iter()
            .map(|d| {
                let v = (d - mean) / mean;
                v * v
            })
            .sum()
    } else {
        0.0
    };

    ImbalanceReport {
        mean_nanos: mean,
        variance,
        needs_rebalance: variance > threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn test_equal_durations_have_zero_variance() {
        let report = analyze_imbalance(&ms(&[7, 7]), DEFAULT_VARIANCE_THRESHOLD);
        assert_relative_eq!(report.variance, 0.0);
        assert!(!report.needs_rebalance);
    }

    #[test]
    fn test_one_slow_device_out_of_three() {
        // mean 20ms: (-0.5)² + (-0.5)² + 1² = 1.5
        let report = analyze_imbalance(&ms(&[10, 10, 40]), DEFAULT_VARIANCE_THRESHOLD);
        assert_relative_eq!(report.mean_nanos, 20_000_000.0);
        assert_relative_eq!(report.variance, 1.5, epsilon = 1e-12);
        assert!(!report.needs_rebalance);
        assert!(analyze_imbalance(&ms(&[10, 10, 40]), 1.0).needs_rebalance);
    }

    #[test]
    fn test_strong_imbalance_crosses_default_threshold() {
        // mean 50ms: 0.64 + 0.64 + 0.64 + 5.76 = 7.68
        let report = analyze_imbalance(&ms(&[10, 10, 10, 170]), DEFAULT_VARIANCE_THRESHOLD);
        assert_relative_eq!(report.variance, 7.68, epsilon = 1e-9);
        assert!(report.needs_rebalance);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(analyze_imbalance(&[], 1.8).variance, 0.0);
        assert_eq!(analyze_imbalance(&ms(&[0, 0]), 1.8).variance, 0.0);
    }
}
