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

//! The rolling performance history consulted by the tuner.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of retained samples after which the history collapses.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Aggregated measurements for one epoch under a fixed partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    /// Per-device workload amounts used during the epoch.
    pub workload_distribution: Vec<u32>,
    /// Average wall-clock duration of one frame.
    pub duration: Duration,
    /// Per-device estimated GPU-bound duration, averaged per frame.
    pub estimated_gpu_duration: Vec<Duration>,
}

/// Everything the tuner needs to carry from one epoch to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerState {
    total_workload: u32,
    device_count: usize,
    history_limit: usize,
    frame_infos: Vec<FrameInfo>,
}

impl TunerState {
    /// Starts an empty history for a session.
    pub fn new(total_workload: u32, device_count: usize) -> Self {
        Self::with_history_limit(total_workload, device_count, DEFAULT_HISTORY_LIMIT)
    }

    /// Starts an empty history that collapses once it holds more than
    /// `history_limit` samples.
    pub fn with_history_limit(total_workload: u32, device_count: usize, history_limit: usize) -> Self {
        Self {
            total_workload,
            device_count,
            history_limit,
            frame_infos: Vec::new(),
        }
    }

    /// Appends a sample.
    ///
    /// If the history already holds more than the limit, it is first collapsed
    /// to its most recent entry, so it never exceeds `limit + 1` entries.
    pub fn add_frame_info(&mut self, frame: FrameInfo) {
        debug_assert_eq!(frame.workload_distribution.len(), self.device_count);
        debug_assert_eq!(frame.estimated_gpu_duration.len(), self.device_count);

        if self.frame_infos.len() > self.history_limit {
            log::debug!(
                "Tuner: history exceeded {} samples, collapsing to the latest",
                self.history_limit
            );
            self.compact();
        }
        self.frame_infos.push(frame);
    }

    /// Drops every sample but the most recent one.
    pub fn compact(&mut self) {
        if let Some(last) = self.frame_infos.pop() {
            self.frame_infos.clear();
            self.frame_infos.push(last);
        }
    }

    /// The most recent sample.
    pub fn latest(&self) -> Option<&FrameInfo> {
        self.frame_infos.last()
    }

    /// The retained sample with the shortest frame duration.
    ///
    /// Ties go to the oldest sample.
    pub fn best(&self) -> Option<&FrameInfo> {
        self.frame_infos.iter().min_by_key(|info| info.duration)
    }

    /// All retained samples, oldest first.
    pub fn frame_infos(&self) -> &[FrameInfo] {
        &self.frame_infos
    }

    /// Total workload of the session.
    pub fn total_workload(&self) -> u32 {
        self.total_workload
    }

    /// Number of participating devices.
    pub fn device_count(&self) -> usize {
        self.device_count
    }

    /// Collapse threshold.
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }
}
