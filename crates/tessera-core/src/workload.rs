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

//! Workload partitions across participating devices.
//!
//! The workload is an opaque count of units (image rows). A [`Partition`] hands
//! every device one contiguous run of units. Partitions are immutable once built:
//! the orchestrator replaces the whole value between epochs instead of mutating it
//! while frames are in flight.

use crate::error::PartitionError;
use serde::{Deserialize, Serialize};

/// One participating device's share of the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSlice {
    /// Stable device index, `0..device_count`.
    pub index: usize,
    /// Number of contiguous units (rows) assigned to the device.
    pub amount: u32,
    /// First unit of the slice: the sum of all preceding devices' amounts.
    pub offset: u32,
}

impl DeviceSlice {
    /// One past the last unit of the slice.
    pub fn end(&self) -> u32 {
        self.offset + self.amount
    }
}

/// A complete, contiguous assignment of the total workload to every device.
///
/// Invariants (checked on construction):
/// - at least one device;
/// - every device holds at least one unit;
/// - offsets are contiguous prefix sums starting at zero;
/// - the amounts add up to the total workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    total: u32,
    slices: Vec<DeviceSlice>,
}

impl Partition {
    /// Splits `total` evenly across `device_count` devices.
    ///
    /// Each device gets `total / device_count` units and the flooring remainder
    /// goes to device 0.
    pub fn even(total: u32, device_count: usize) -> Result<Self, PartitionError> {
        if device_count == 0 {
            return Err(PartitionError::Empty);
        }
        if (total as usize) < device_count {
            return Err(PartitionError::InsufficientWorkload {
                total,
                devices: device_count,
            });
        }

        let share = total / device_count as u32;
        let mut amounts = vec![share; device_count];
        amounts[0] += total - share * device_count as u32;
        Self::with_total(&amounts, total)
    }

    /// Builds a partition from per-device amounts; the total is their sum.
    pub fn from_amounts(amounts: &[u32]) -> Result<Self, PartitionError> {
        let sum: u64 = amounts.iter().map(|&a| a as u64).sum();
        let total = u32::try_from(sum).map_err(|_| PartitionError::SumMismatch {
            expected: u32::MAX as u64,
            actual: sum,
        })?;
        Self::with_total(amounts, total)
    }

    /// Builds a partition from per-device amounts that must add up to `total`.
    pub fn with_total(amounts: &[u32], total: u32) -> Result<Self, PartitionError> {
        if amounts.is_empty() {
            return Err(PartitionError::Empty);
        }
        if let Some(device) = amounts.iter().position(|&a| a == 0) {
            return Err(PartitionError::ZeroWorkload { device });
        }
        let sum: u64 = amounts.iter().map(|&a| a as u64).sum();
        if sum != total as u64 {
            return Err(PartitionError::SumMismatch {
                expected: total as u64,
                actual: sum,
            });
        }

        let mut offset = 0u32;
        let slices = amounts
            .iter()
            .enumerate()
            .map(|(index, &amount)| {
                let slice = DeviceSlice {
                    index,
                    amount,
                    offset,
                };
                offset += amount;
                slice
            })
            .collect();

        Ok(Self { total, slices })
    }

    /// The total workload covered by this partition.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Number of participating devices.
    pub fn device_count(&self) -> usize {
        self.slices.len()
    }

    /// All device slices in index order.
    pub fn slices(&self) -> &[DeviceSlice] {
        &self.slices
    }

    /// The slice assigned to `device`, if it exists.
    pub fn slice(&self, device: usize) -> Option<&DeviceSlice> {
        self.slices.get(device)
    }

    /// Per-device amounts in index order.
    pub fn amounts(&self) -> Vec<u32> {
        self.slices.iter().map(|s| s.amount).collect()
    }
}

/// How the tuner arrived at the partition for the next epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningMode {
    /// Proportional rebalance from measured per-device throughput.
    Rebalance,
    /// One unit moved between two devices, starting from the best partition seen.
    Perturb,
    /// Partition left unchanged.
    Hold,
}

impl TuningMode {
    /// Short lowercase name, used as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            TuningMode::Rebalance => "rebalance",
            TuningMode::Perturb => "perturb",
            TuningMode::Hold => "hold",
        }
    }
}
