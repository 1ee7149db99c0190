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

//! # Tessera Core
//!
//! Foundational crate containing the contracts and value types shared by every
//! layer of the multi-device renderer: the device trait, the synchronization
//! resource pool, workload partitions, per-frame parameters and the error taxonomy.

#![warn(missing_docs)]

pub mod device;
pub mod error;
pub mod host;
pub mod params;
pub mod sync;
pub mod telemetry;
pub mod utils;
pub mod workload;

pub use device::{DeviceInfo, FrameResources, RenderDevice, Submission};
pub use error::{DeviceError, GpuSyncError, PartitionError, SessionError};
pub use host::HostControl;
pub use params::FrameParams;
pub use sync::{FenceHandle, FenceStatus, SemaphoreHandle, SyncPool, INFINITE_TIMEOUT};
pub use utils::timer::Stopwatch;
pub use workload::{DeviceSlice, Partition, TuningMode};
