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

//! Session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tessera_control::{TunerConfig, DEFAULT_HISTORY_LIMIT};
use tessera_core::SessionError;

/// Everything a render session needs besides its devices and host.
///
/// Every field has a default, so a partial TOML file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels; this is the total workload in rows.
    pub height: u32,
    /// Use at most this many devices, in index order.
    pub device_limit: Option<usize>,
    /// Samples per pixel traced by one render call.
    pub samples_per_render_call: u32,
    /// Samples per pixel of a converged image.
    pub total_samples: u32,
    /// Frames in the first epoch.
    pub initial_epoch_frames: u64,
    /// Wall-clock time each epoch aims to last, in milliseconds.
    pub target_window_ms: u64,
    /// Extra frames added to every epoch.
    pub margin_frames: u64,
    /// History collapses once it holds more than this many samples.
    pub history_limit: usize,
    /// Seed for the tuner's exploration step; random when absent.
    pub seed: Option<u64>,
    /// Tuner thresholds and odds.
    #[serde(flatten)]
    pub tuner: TunerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_limit: None,
            samples_per_render_call: 1,
            total_samples: 1,
            initial_epoch_frames: 100,
            target_window_ms: 4_000,
            margin_frames: 50,
            history_limit: DEFAULT_HISTORY_LIMIT,
            seed: None,
            tuner: TunerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Rejects configurations the render loop cannot run.
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |msg: String| Err(SessionError::InvalidConfig(msg));
        if self.width == 0 || self.height == 0 {
            return invalid(format!(
                "image size {}x{} must be non-zero",
                self.width, self.height
            ));
        }
        if self.samples_per_render_call == 0 {
            return invalid("samples_per_render_call must be at least 1".to_string());
        }
        if self.total_samples == 0 || self.total_samples % self.samples_per_render_call != 0 {
            return invalid(format!(
                "total_samples ({}) must be a non-zero multiple of samples_per_render_call ({})",
                self.total_samples, self.samples_per_render_call
            ));
        }
        if self.initial_epoch_frames == 0 {
            return invalid("initial_epoch_frames must be at least 1".to_string());
        }
        if self.device_limit == Some(0) {
            return invalid("device_limit must be at least 1".to_string());
        }
        if !self.tuner.variance_threshold.is_finite() || self.tuner.variance_threshold < 0.0 {
            return invalid(format!(
                "variance_threshold {} must be a non-negative number",
                self.tuner.variance_threshold
            ));
        }
        Ok(())
    }

    /// Checks that `device_count` devices can each get at least one row.
    pub fn validate_device_count(&self, device_count: usize) -> Result<(), SessionError> {
        if device_count == 0 {
            return Err(SessionError::NoDevices);
        }
        if (self.height as usize) < device_count {
            return Err(SessionError::InvalidConfig(format!(
                "{} rows cannot be split across {device_count} devices",
                self.height
            )));
        }
        Ok(())
    }

    /// Render calls needed for one converged image.
    pub fn render_calls_per_image(&self) -> u32 {
        (self.total_samples / self.samples_per_render_call.max(1)).max(1)
    }

    /// The epoch wall-clock target.
    pub fn target_window(&self) -> Duration {
        Duration::from_millis(self.target_window_ms)
    }
}
