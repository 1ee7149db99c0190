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

//! Per-device frame execution.

use std::time::{Duration, Instant};
use tessera_core::{
    DeviceError, DeviceInfo, DeviceSlice, FrameParams, FrameResources, GpuSyncError, RenderDevice,
    SemaphoreHandle, Submission, SyncPool,
};

/// One device together with everything provisioned for its current slice.
#[derive(Debug)]
pub struct DeviceLane {
    device: Box<dyn RenderDevice>,
    slice: Option<DeviceSlice>,
    resources: Option<FrameResources>,
    pool: Option<SyncPool>,
    slot: Option<u32>,
    last_present: Option<Instant>,
    gpu_sample: Duration,
}

impl DeviceLane {
    /// Wraps an unprovisioned device.
    pub fn new(device: Box<dyn RenderDevice>) -> Self {
        Self {
            device,
            slice: None,
            resources: None,
            pool: None,
            slot: None,
            last_present: None,
            gpu_sample: Duration::ZERO,
        }
    }

    /// The device identity.
    pub fn info(&self) -> &DeviceInfo {
        self.device.info()
    }

    /// The slice currently provisioned, if any.
    pub fn slice(&self) -> Option<&DeviceSlice> {
        self.slice.as_ref()
    }

    /// The synchronization pool for the current slice.
    pub fn pool(&self) -> Option<&SyncPool> {
        self.pool.as_ref()
    }

    /// (Re)creates the device's work-sized resources for `slice`.
    ///
    /// Any previous resources are drained and destroyed first.
    pub fn provision(&mut self, slice: DeviceSlice, image_size: [u32; 2]) -> Result<(), DeviceError> {
        self.release_resources()?;

        let device = self.info().index;
        let resources = self.device.create_frame_resources(&slice, image_size)?;
        let pool = if resources.render_semaphores.len() != resources.fences.len() {
            Err(DeviceError::ProvisionFailed {
                device,
                reason: format!(
                    "{} render semaphores for {} slots",
                    resources.render_semaphores.len(),
                    resources.fences.len()
                ),
            })
        } else {
            SyncPool::new(
                device,
                resources.fences.clone(),
                resources.acquire_semaphores.clone(),
            )
        };
        let pool = match pool {
            Ok(pool) => pool,
            Err(err) => {
                self.device.destroy_frame_resources(resources)?;
                return Err(err);
            }
        };

        log::debug!(
            "Executor: device {} provisioned rows {}..{} with {} render images",
            self.info().index,
            slice.offset,
            slice.end(),
            pool.render_image_count()
        );
        self.slice = Some(slice);
        self.resources = Some(resources);
        self.pool = Some(pool);
        self.slot = None;
        Ok(())
    }

    /// Waits for the device to go idle and destroys its current resources.
    pub fn release_resources(&mut self) -> Result<(), DeviceError> {
        let Some(resources) = self.resources.take() else {
            return Ok(());
        };
        self.pool = None;
        self.slice = None;
        self.slot = None;

        let device = self.info().index;
        self.device
            .wait_idle()
            .map_err(|err| DeviceError::ProvisionFailed {
                device,
                reason: format!("device did not drain before teardown: {err}"),
            })?;
        self.device.destroy_frame_resources(resources)
    }

    /// Restarts present-time tracking at an epoch boundary.
    pub fn reset_clock(&mut self, now: Instant) {
        self.last_present = Some(now);
        self.gpu_sample = Duration::ZERO;
    }

    /// GPU-bound time measured by the latest acquisition.
    ///
    /// This is the time between the previous present and the moment the next
    /// image became available.
    pub fn gpu_sample(&self) -> Duration {
        self.gpu_sample
    }

    fn device_index(&self) -> usize {
        self.info().index
    }

    fn not_provisioned(&self, stage: &str) -> GpuSyncError {
        GpuSyncError::AcquireFailure {
            device: self.device_index(),
            reason: format!("{stage} before frame resources were provisioned"),
        }
    }

    fn current_slot(&self, stage: &str) -> Result<u32, GpuSyncError> {
        self.slot.ok_or_else(|| GpuSyncError::SubmitFailure {
            device: self.device_index(),
            reason: format!("{stage} without an acquired image"),
        })
    }

    /// Acquires the next render image and rebinds the semaphore pool.
    pub fn acquire(&mut self, timeout: Duration) -> Result<u32, GpuSyncError> {
        let signal = match &self.pool {
            Some(pool) => pool.acquire_semaphore(),
            None => return Err(self.not_provisioned("acquire")),
        };
        let slot = self.device.acquire_next_image(signal, timeout)?;
        let acquired_at = Instant::now();

        if let Some(pool) = self.pool.as_mut() {
            pool.release(slot)?;
        }
        self.gpu_sample = self
            .last_present
            .map_or(Duration::ZERO, |presented| acquired_at.saturating_duration_since(presented));
        self.slot = Some(slot);
        Ok(slot)
    }

    /// Waits for the previous use of the acquired slot to finish.
    pub fn wait_fence(&self, timeout: Duration) -> Result<(), GpuSyncError> {
        let slot = self.current_slot("fence wait")?;
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| self.not_provisioned("fence wait"))?;
        pool.wait_and_reset_fence(&*self.device, slot, timeout)
    }

    /// Parameters for the acquired slot, derived from the device's slice.
    pub fn frame_params(
        &self,
        image_size: [u32; 2],
        samples_per_render_call: u32,
        number: u32,
        frame: u64,
    ) -> Option<FrameParams> {
        self.slice.as_ref().map(|slice| {
            FrameParams::for_slice(slice, image_size, samples_per_render_call, number, frame)
        })
    }

    /// Uploads `params` for the acquired slot.
    pub fn upload(&mut self, params: &FrameParams) -> Result<(), GpuSyncError> {
        let slot = self.current_slot("upload")?;
        self.device.write_frame_params(slot, params)
    }

    /// Submits the pre-recorded work for the acquired slot.
    pub fn submit(&mut self) -> Result<(), GpuSyncError> {
        let slot = self.current_slot("submit")?;
        let device = self.device_index();
        let missing = |what: &str| GpuSyncError::SubmitFailure {
            device,
            reason: format!("no {what} for slot {slot}"),
        };

        let pool = self.pool.as_ref().ok_or_else(|| self.not_provisioned("submit"))?;
        let submission = Submission {
            slot,
            wait: pool.slot_semaphore(slot).ok_or_else(|| missing("acquire semaphore"))?,
            signal: self.render_semaphore(slot).ok_or_else(|| missing("render semaphore"))?,
            fence: pool.fence(slot).ok_or_else(|| missing("fence"))?,
        };
        self.device.submit(submission)
    }

    /// Queues the acquired slot for presentation and stamps the present time.
    pub fn present(&mut self) -> Result<(), GpuSyncError> {
        let slot = self.current_slot("present")?;
        let wait = self
            .render_semaphore(slot)
            .ok_or_else(|| GpuSyncError::PresentFailure {
                device: self.device_index(),
                reason: format!("no render semaphore for slot {slot}"),
            })?;
        self.device.present(slot, wait)?;
        self.last_present = Some(Instant::now());
        self.slot = None;
        Ok(())
    }

    fn render_semaphore(&self, slot: u32) -> Option<SemaphoreHandle> {
        self.resources
            .as_ref()
            .and_then(|resources| resources.render_semaphores.get(slot as usize))
            .copied()
    }

    /// Runs one whole frame on this lane alone.
    pub fn run_frame(&mut self, params: &FrameParams, timeout: Duration) -> Result<(), GpuSyncError> {
        self.acquire(timeout)?;
        self.wait_fence(timeout)?;
        self.upload(params)?;
        self.submit()?;
        self.present()
    }
}

impl Drop for DeviceLane {
    fn drop(&mut self) {
        if let Err(err) = self.release_resources() {
            log::warn!("Executor: failed to release device resources: {err}");
        }
    }
}
