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

//! Defines the hierarchy of error types for the partitioned render loop.
//!
//! Every error in this module is fatal for the running session: nothing in the
//! core retries, and a failing device is never dropped from the partition.

use crate::telemetry::MetricsError;
use std::fmt;
use std::time::Duration;

/// A failure of the per-frame synchronization pipeline on one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuSyncError {
    /// The device could not hand out a valid render-image slot.
    AcquireFailure {
        /// Index of the failing device.
        device: usize,
        /// Backend-provided reason.
        reason: String,
    },
    /// A fence did not signal within the (intentionally enormous) bound.
    FenceTimeout {
        /// Index of the failing device.
        device: usize,
        /// Render-image slot the fence guards.
        slot: u32,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// The device rejected the submitted work.
    SubmitFailure {
        /// Index of the failing device.
        device: usize,
        /// Backend-provided reason.
        reason: String,
    },
    /// The device rejected the presentation request.
    PresentFailure {
        /// Index of the failing device.
        device: usize,
        /// Backend-provided reason.
        reason: String,
    },
}

impl GpuSyncError {
    /// Returns the index of the device that produced this error.
    pub fn device(&self) -> usize {
        match self {
            GpuSyncError::AcquireFailure { device, .. }
            | GpuSyncError::FenceTimeout { device, .. }
            | GpuSyncError::SubmitFailure { device, .. }
            | GpuSyncError::PresentFailure { device, .. } => *device,
        }
    }
}

impl fmt::Display for GpuSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuSyncError::AcquireFailure { device, reason } => {
                write!(f, "Device {device}: failed to acquire next render image: {reason}")
            }
            GpuSyncError::FenceTimeout {
                device,
                slot,
                timeout,
            } => write!(
                f,
                "Device {device}: fence for slot {slot} did not signal within {timeout:?}"
            ),
            GpuSyncError::SubmitFailure { device, reason } => {
                write!(f, "Device {device}: failed to submit work: {reason}")
            }
            GpuSyncError::PresentFailure { device, reason } => {
                write!(f, "Device {device}: failed to present: {reason}")
            }
        }
    }
}

impl std::error::Error for GpuSyncError {}

/// A violation of the partition invariants.
///
/// A well-behaved tuner never produces one of these; seeing one at runtime
/// means a programming error upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// The partition has no devices.
    Empty,
    /// A device was assigned zero units of work.
    ZeroWorkload {
        /// Index of the starved device.
        device: usize,
    },
    /// The amounts do not add up to the total workload.
    SumMismatch {
        /// The total workload the partition must cover.
        expected: u64,
        /// The actual sum of the amounts.
        actual: u64,
    },
    /// There are fewer units of work than devices, so some device would get zero.
    InsufficientWorkload {
        /// The total workload.
        total: u32,
        /// The number of devices.
        devices: usize,
    },
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionError::Empty => write!(f, "Partition has no devices."),
            PartitionError::ZeroWorkload { device } => {
                write!(f, "Device {device} was assigned zero workload.")
            }
            PartitionError::SumMismatch { expected, actual } => write!(
                f,
                "Partition amounts sum to {actual}, expected total workload {expected}."
            ),
            PartitionError::InsufficientWorkload { total, devices } => write!(
                f,
                "Total workload {total} cannot give every one of {devices} devices at least one unit."
            ),
        }
    }
}

impl std::error::Error for PartitionError {}

/// A failure while provisioning or releasing a device's work-sized resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The backend could not create the requested resources.
    ProvisionFailed {
        /// Index of the failing device.
        device: usize,
        /// Backend-provided reason.
        reason: String,
    },
    /// An operation needed frame resources but none are currently provisioned.
    NotProvisioned {
        /// Index of the device.
        device: usize,
    },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::ProvisionFailed { device, reason } => {
                write!(f, "Device {device}: failed to provision frame resources: {reason}")
            }
            DeviceError::NotProvisioned { device } => {
                write!(f, "Device {device}: frame resources are not provisioned")
            }
        }
    }
}

impl std::error::Error for DeviceError {}

/// A high-level error that terminates a render session.
#[derive(Debug)]
pub enum SessionError {
    /// The session was started without any device.
    NoDevices,
    /// The session configuration is unusable.
    InvalidConfig(String),
    /// A synchronization step failed on a device.
    Sync(GpuSyncError),
    /// A partition invariant was violated.
    Partition(PartitionError),
    /// Provisioning device resources failed.
    Device(DeviceError),
    /// The session metrics could not be registered.
    Telemetry(MetricsError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NoDevices => write!(f, "No devices available for the render session."),
            SessionError::InvalidConfig(msg) => write!(f, "Invalid session configuration: {msg}"),
            SessionError::Sync(err) => write!(f, "Synchronization failure: {err}"),
            SessionError::Partition(err) => write!(f, "Partition invariant violated: {err}"),
            SessionError::Device(err) => write!(f, "Device resource failure: {err}"),
            SessionError::Telemetry(err) => write!(f, "Telemetry setup failure: {err}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Sync(err) => Some(err),
            SessionError::Partition(err) => Some(err),
            SessionError::Device(err) => Some(err),
            SessionError::Telemetry(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GpuSyncError> for SessionError {
    fn from(err: GpuSyncError) -> Self {
        SessionError::Sync(err)
    }
}

impl From<PartitionError> for SessionError {
    fn from(err: PartitionError) -> Self {
        SessionError::Partition(err)
    }
}

impl From<DeviceError> for SessionError {
    fn from(err: DeviceError) -> Self {
        SessionError::Device(err)
    }
}

impl From<MetricsError> for SessionError {
    fn from(err: MetricsError) -> Self {
        SessionError::Telemetry(err)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn sync_error_display() {
        let err = GpuSyncError::AcquireFailure {
            device: 1,
            reason: "out of date".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Device 1: failed to acquire next render image: out of date"
        );
        assert_eq!(err.device(), 1);
    }

    #[test]
    fn fence_timeout_carries_slot() {
        let err = GpuSyncError::FenceTimeout {
            device: 2,
            slot: 3,
            timeout: Duration::from_millis(5),
        };
        assert_eq!(err.device(), 2);
        assert!(format!("{err}").contains("slot 3"));
    }

    #[test]
    fn session_error_wraps_sync_error() {
        let err: SessionError = GpuSyncError::SubmitFailure {
            device: 0,
            reason: "queue lost".to_string(),
        }
        .into();
        assert_eq!(
            format!("{err}"),
            "Synchronization failure: Device 0: failed to submit work: queue lost"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn session_error_wraps_partition_error() {
        let err: SessionError = PartitionError::SumMismatch {
            expected: 1080,
            actual: 1079,
        }
        .into();
        assert!(format!("{err}").contains("1079"));
        assert!(err.source().is_some());
        assert!(SessionError::NoDevices.source().is_none());
    }
}
