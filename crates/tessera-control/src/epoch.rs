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

//! Per-epoch measurement aggregation and epoch-length adaptation.

use crate::history::FrameInfo;
use std::time::Duration;
use tessera_core::Stopwatch;

/// Collects frame timings for one epoch under a fixed partition.
#[derive(Debug)]
pub struct EpochAccumulator {
    frames: u64,
    gpu_durations: Vec<Duration>,
    clock: Stopwatch,
}

/// What an epoch measured, ready to be appended to the tuner history.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    /// Frames rendered during the epoch.
    pub frames: u64,
    /// Wall-clock duration of the whole epoch.
    pub elapsed: Duration,
    /// The per-frame averages.
    pub info: FrameInfo,
}

impl EpochAccumulator {
    /// Starts timing a new epoch for `device_count` devices.
    pub fn start(device_count: usize) -> Self {
        Self {
            frames: 0,
            gpu_durations: vec![Duration::ZERO; device_count],
            clock: Stopwatch::start(),
        }
    }

    /// Adds one frame's estimated GPU-bound time for `device`.
    pub fn record_gpu_duration(&mut self, device: usize, duration: Duration) {
        if let Some(total) = self.gpu_durations.get_mut(device) {
            *total += duration;
        }
    }

    /// Counts one completed frame.
    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    /// Frames completed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Per-device GPU durations accumulated so far.
    pub fn gpu_durations(&self) -> &[Duration] {
        &self.gpu_durations
    }

    /// Closes the epoch using the wall-clock time since [`EpochAccumulator::start`].
    ///
    /// Returns `None` if no frame completed.
    pub fn finish(self, workload_distribution: Vec<u32>) -> Option<EpochSummary> {
        let elapsed = self.clock.elapsed();
        self.finish_with_elapsed(elapsed, workload_distribution)
    }

    /// Closes the epoch with an externally measured wall-clock duration.
    pub fn finish_with_elapsed(
        self,
        elapsed: Duration,
        workload_distribution: Vec<u32>,
    ) -> Option<EpochSummary> {
        if self.frames == 0 {
            return None;
        }
        let frames = self.frames;
        let info = FrameInfo {
            workload_distribution,
            duration: per_frame(elapsed, frames),
            estimated_gpu_duration: self
                .gpu_durations
                .into_iter()
                .map(|total| per_frame(total, frames))
                .collect(),
        };
        Some(EpochSummary {
            frames,
            elapsed,
            info,
        })
    }
}

fn per_frame(total: Duration, frames: u64) -> Duration {
    let nanos = total.as_nanos() / u128::from(frames.max(1));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Frames in the next epoch: `ceil((target_window + margin * dpf) / dpf)`.
///
/// Keeps the epoch's wall time close to `target_window` whatever the frame
/// rate, plus `margin_frames` frames. A zero frame duration falls back to
/// `fallback`.
pub fn next_epoch_length(
    duration_per_frame: Duration,
    target_window: Duration,
    margin_frames: u64,
    fallback: u64,
) -> u64 {
    let per_frame = duration_per_frame.as_nanos();
    if per_frame == 0 {
        return fallback.max(1);
    }
    let window = target_window.as_nanos() + u128::from(margin_frames) * per_frame;
    let frames = window.div_ceil(per_frame);
    u64::try_from(frames).unwrap_or(u64::MAX).max(1)
}
