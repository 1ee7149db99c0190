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

//! Events published by a running render session.

use crate::workload::TuningMode;
use std::time::Duration;

/// A notable point in the life of a render session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An epoch finished and its measurements were aggregated.
    EpochCompleted {
        /// Zero-based epoch number.
        epoch: u64,
        /// Frames rendered during the epoch.
        frames: u64,
        /// Wall-clock duration of the epoch.
        duration: Duration,
        /// Per-device workload used during the epoch.
        workload: Vec<u32>,
        /// Per-device estimated GPU time accumulated during the epoch.
        estimated_gpu: Vec<Duration>,
    },
    /// The tuner picked a new partition for the next epoch.
    Repartitioned {
        /// Epoch whose measurements triggered the change.
        epoch: u64,
        /// Which tuning rule produced the change.
        mode: TuningMode,
        /// The new per-device workload.
        workload: Vec<u32>,
        /// Frames in the next epoch.
        next_epoch_frames: u64,
    },
    /// The host asked the session to stop.
    Stopped {
        /// Total frames rendered by the session.
        frames: u64,
        /// Total epochs completed (a partial final epoch is not counted).
        epochs: u64,
    },
}
