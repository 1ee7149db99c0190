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

//! The contract every participating render device fulfils.
//!
//! A device renders one contiguous band of rows of the shared image per frame
//! and presents it into its own ring of render images. The orchestrator only
//! talks to devices through [`RenderDevice`], so a Vulkan backend, a simulated
//! backend and test doubles are interchangeable.

use crate::error::{DeviceError, GpuSyncError};
use crate::params::FrameParams;
use crate::sync::{FenceHandle, FenceStatus, SemaphoreHandle};
use crate::workload::DeviceSlice;
use std::fmt::Debug;
use std::time::Duration;

/// Static identity of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Stable index of the device within the session.
    pub index: usize,
    /// Human-readable adapter name.
    pub name: String,
}

/// Synchronization objects created alongside a device's work-sized resources.
///
/// There is one fence and one render semaphore per render-image slot, and one
/// more acquire semaphore than slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameResources {
    /// One fence per slot, created in the signaled state.
    pub fences: Vec<FenceHandle>,
    /// `slots + 1` semaphores signaled by image acquisition.
    pub acquire_semaphores: Vec<SemaphoreHandle>,
    /// One semaphore per slot, signaled by submission and waited on by present.
    pub render_semaphores: Vec<SemaphoreHandle>,
}

impl FrameResources {
    /// Number of render-image slots.
    pub fn render_image_count(&self) -> u32 {
        self.fences.len() as u32
    }
}

/// One submission of recorded work for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// The render-image slot being rendered.
    pub slot: u32,
    /// Semaphore signaled by the acquisition of `slot`.
    pub wait: SemaphoreHandle,
    /// Semaphore to signal once rendering completes.
    pub signal: SemaphoreHandle,
    /// Fence to signal once rendering completes.
    pub fence: FenceHandle,
}

/// A device that can render a band of the image and present it.
pub trait RenderDevice: Send + Debug {
    /// Returns the identity of the device.
    fn info(&self) -> &DeviceInfo;

    /// (Re)creates all work-sized resources for `slice` of an image of
    /// `image_size` pixels and returns the synchronization handles.
    fn create_frame_resources(
        &mut self,
        slice: &DeviceSlice,
        image_size: [u32; 2],
    ) -> Result<FrameResources, DeviceError>;

    /// Destroys the resources previously returned by `create_frame_resources`.
    ///
    /// Called only after the device is idle.
    fn destroy_frame_resources(&mut self, resources: FrameResources) -> Result<(), DeviceError>;

    /// Acquires the next render image, arranging for `signal` to be signaled
    /// once it is ready. Returns the slot index.
    fn acquire_next_image(
        &mut self,
        signal: SemaphoreHandle,
        timeout: Duration,
    ) -> Result<u32, GpuSyncError>;

    /// Waits until `fence` signals or `timeout` elapses.
    fn wait_for_fence(
        &self,
        fence: FenceHandle,
        timeout: Duration,
    ) -> Result<FenceStatus, GpuSyncError>;

    /// Returns `fence` to the unsignaled state.
    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GpuSyncError>;

    /// Uploads the per-frame parameter block for `slot`.
    fn write_frame_params(&mut self, slot: u32, params: &FrameParams) -> Result<(), GpuSyncError>;

    /// Submits the pre-recorded work for a slot.
    fn submit(&mut self, submission: Submission) -> Result<(), GpuSyncError>;

    /// Queues `slot` for presentation once `wait` signals.
    fn present(&mut self, slot: u32, wait: SemaphoreHandle) -> Result<(), GpuSyncError>;

    /// Blocks until every submitted operation has completed.
    fn wait_idle(&mut self) -> Result<(), GpuSyncError>;
}
