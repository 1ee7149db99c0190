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

//! Configuration of a simulated device.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How a simulated device performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedDeviceConfig {
    /// Adapter name reported through `DeviceInfo`.
    pub name: String,
    /// Image rows traced per second at one sample per pixel.
    pub rows_per_second: f64,
    /// Number of render images in the device's swapchain.
    pub render_image_count: u32,
    /// Time a present takes to retire its image, in microseconds.
    pub present_latency_us: u64,
    /// Reject every submission after this many have been accepted.
    #[serde(skip)]
    pub fail_submit_after: Option<u64>,
    /// Reject every present after this many have been accepted.
    #[serde(skip)]
    pub fail_present_after: Option<u64>,
}

impl SimulatedDeviceConfig {
    /// A device with the given name and throughput and default swapchain settings.
    pub fn new(name: impl Into<String>, rows_per_second: f64) -> Self {
        Self {
            name: name.into(),
            rows_per_second,
            ..Self::default()
        }
    }

    /// Time the device needs to render `rows` rows at `samples` samples per pixel.
    pub fn render_cost(&self, rows: u32, samples: u32) -> Duration {
        if self.rows_per_second <= 0.0 {
            return Duration::ZERO;
        }
        let secs = f64::from(rows) * f64::from(samples.max(1)) / self.rows_per_second;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Present latency as a [`Duration`].
    pub fn present_latency(&self) -> Duration {
        Duration::from_micros(self.present_latency_us)
    }
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            name: "simulated".to_string(),
            rows_per_second: 100_000.0,
            render_image_count: 3,
            present_latency_us: 0,
            fail_submit_after: None,
            fail_present_after: None,
        }
    }
}

/// Error returned when a `name:rows_per_second[:images]` spec does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDeviceConfigError(String);

impl fmt::Display for ParseDeviceConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid device spec: {}", self.0)
    }
}

impl std::error::Error for ParseDeviceConfigError {}

impl FromStr for SimulatedDeviceConfig {
    type Err = ParseDeviceConfigError;

    /// Parses `name:rows_per_second` with an optional `:render_image_count`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let name = parts
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ParseDeviceConfigError(format!("'{s}' has no device name")))?;
        let rows_per_second = parts
            .next()
            .ok_or_else(|| ParseDeviceConfigError(format!("'{s}' has no throughput")))?
            .parse::<f64>()
            .map_err(|e| ParseDeviceConfigError(format!("'{s}': {e}")))?;
        if !(rows_per_second.is_finite() && rows_per_second > 0.0) {
            return Err(ParseDeviceConfigError(format!(
                "'{s}': throughput must be positive"
            )));
        }

        let mut config = Self::new(name, rows_per_second);
        if let Some(images) = parts.next() {
            config.render_image_count = images
                .parse()
                .map_err(|e| ParseDeviceConfigError(format!("'{s}': {e}")))?;
        }
        if parts.next().is_some() {
            return Err(ParseDeviceConfigError(format!("'{s}' has too many fields")));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_and_throughput() {
        let config: SimulatedDeviceConfig = "igpu:2500".parse().unwrap();
        assert_eq!(config.name, "igpu");
        assert_eq!(config.rows_per_second, 2500.0);
        assert_eq!(config.render_image_count, 3);
    }

    #[test]
    fn test_parse_with_image_count() {
        let config: SimulatedDeviceConfig = "dgpu:1e5:2".parse().unwrap();
        assert_eq!(config.render_image_count, 2);
    }

    #[test]
    fn test_parse_rejects_bad_specs() {
        for spec in ["", ":100", "gpu", "gpu:fast", "gpu:-1", "gpu:10:2:9"] {
            assert!(spec.parse::<SimulatedDeviceConfig>().is_err(), "{spec}");
        }
    }

    #[test]
    fn test_render_cost_scales_with_rows_and_samples() {
        let config = SimulatedDeviceConfig::new("gpu", 1000.0);
        assert_eq!(config.render_cost(500, 1), Duration::from_millis(500));
        assert_eq!(config.render_cost(100, 4), Duration::from_millis(400));
    }
}
