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

//! A headless device backend that simulates a GPU with a worker thread.
//!
//! Submissions and presents are queued on a per-device worker that sleeps for
//! the simulated render time and then signals semaphores and fences, much like
//! a real queue. Every semaphore transition is validated, so a caller that
//! signals a semaphore still awaited by queued work gets an error instead of
//! silent corruption.

mod config;
mod state;

pub use self::config::{ParseDeviceConfigError, SimulatedDeviceConfig};
pub use self::state::DeviceStats;

use self::state::{run_worker, Command, ImageState, SemaphoreState, Shared};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tessera_core::sync::FenceStatus;
use tessera_core::{
    DeviceError, DeviceInfo, DeviceSlice, FenceHandle, FrameParams, FrameResources, GpuSyncError,
    RenderDevice, SemaphoreHandle, Submission,
};

/// Caller-side bookkeeping for the currently provisioned slice.
#[derive(Debug)]
struct FrameSlots {
    rows: u32,
    image_count: u32,
    next_image: u32,
    /// Uploaded parameter bytes per slot; empty until the first upload.
    params: Vec<Vec<u8>>,
    resources: FrameResources,
}

/// A read-only view of a simulated device's counters that outlives the device.
#[derive(Debug, Clone)]
pub struct DeviceMonitor {
    shared: Arc<Shared>,
}

impl DeviceMonitor {
    /// A snapshot of the device counters.
    pub fn stats(&self) -> DeviceStats {
        self.shared.lock().stats.clone()
    }
}

/// A simulated render device.
#[derive(Debug)]
pub struct SimulatedDevice {
    info: DeviceInfo,
    config: SimulatedDeviceConfig,
    shared: Arc<Shared>,
    commands: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    slots: Option<FrameSlots>,
    next_handle: u32,
    accepted_submissions: u64,
    accepted_presents: u64,
}

impl SimulatedDevice {
    /// Creates the device and starts its worker thread.
    pub fn new(index: usize, config: SimulatedDeviceConfig) -> Result<Self, DeviceError> {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = {
            let shared = Arc::clone(&shared);
            let name = config.name.clone();
            let latency = config.present_latency();
            thread::Builder::new()
                .name(format!("tessera-sim-{index}"))
                .spawn(move || run_worker(name, shared, rx, latency))
                .map_err(|e| DeviceError::ProvisionFailed {
                    device: index,
                    reason: format!("failed to spawn worker: {e}"),
                })?
        };

        log::info!(
            "Simulated device {index} '{}': {:.0} rows/s, {} render images",
            config.name,
            config.rows_per_second,
            config.render_image_count
        );

        Ok(Self {
            info: DeviceInfo {
                index,
                name: config.name.clone(),
            },
            config,
            shared,
            commands: Some(tx),
            worker: Some(worker),
            slots: None,
            next_handle: 0,
            accepted_submissions: 0,
            accepted_presents: 0,
        })
    }

    /// Builds one device per config, indexed in order.
    pub fn from_configs(
        configs: impl IntoIterator<Item = SimulatedDeviceConfig>,
    ) -> Result<Vec<Self>, DeviceError> {
        configs
            .into_iter()
            .enumerate()
            .map(|(index, config)| Self::new(index, config))
            .collect()
    }

    /// A handle for reading this device's counters.
    pub fn monitor(&self) -> DeviceMonitor {
        DeviceMonitor {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The device's configuration.
    pub fn config(&self) -> &SimulatedDeviceConfig {
        &self.config
    }

    fn index(&self) -> usize {
        self.info.index
    }

    fn allocate(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1);
        handle
    }

    fn enqueue(&self, command: Command) -> Result<(), String> {
        let sender = self
            .commands
            .as_ref()
            .ok_or_else(|| "device worker is shut down".to_string())?;
        self.shared.lock().in_flight += 1;
        sender.send(command).map_err(|_| {
            self.shared.lock().in_flight -= 1;
            "device worker is gone".to_string()
        })
    }

    fn drain(&self) {
        let guard = self.shared.lock();
        let _ = self
            .shared
            .wait_for(guard, tessera_core::INFINITE_TIMEOUT, |state| {
                state.in_flight == 0
            });
    }
}

impl RenderDevice for SimulatedDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_frame_resources(
        &mut self,
        slice: &DeviceSlice,
        _image_size: [u32; 2],
    ) -> Result<FrameResources, DeviceError> {
        let device = self.index();
        if self.slots.is_some() {
            return Err(DeviceError::ProvisionFailed {
                device,
                reason: "frame resources already exist; destroy them first".to_string(),
            });
        }
        if slice.amount == 0 {
            return Err(DeviceError::ProvisionFailed {
                device,
                reason: "cannot provision an empty slice".to_string(),
            });
        }
        let image_count = self.config.render_image_count;
        if image_count == 0 {
            return Err(DeviceError::ProvisionFailed {
                device,
                reason: "render image count must be at least one".to_string(),
            });
        }

        let fences: Vec<FenceHandle> = (0..image_count).map(|_| FenceHandle(self.allocate())).collect();
        let acquire_semaphores: Vec<SemaphoreHandle> = (0..=image_count)
            .map(|_| SemaphoreHandle(self.allocate()))
            .collect();
        let render_semaphores: Vec<SemaphoreHandle> = (0..image_count)
            .map(|_| SemaphoreHandle(self.allocate()))
            .collect();

        {
            let mut state = self.shared.lock();
            state.fences = fences.iter().map(|&fence| (fence, true)).collect();
            state.semaphores = acquire_semaphores
                .iter()
                .chain(&render_semaphores)
                .map(|&semaphore| (semaphore, SemaphoreState::Unsignaled))
                .collect();
            state.images = vec![ImageState::Available; image_count as usize];
            state.stats.provisions += 1;
            state.stats.current_rows = Some(slice.amount);
        }

        let resources = FrameResources {
            fences,
            acquire_semaphores,
            render_semaphores,
        };
        self.slots = Some(FrameSlots {
            rows: slice.amount,
            image_count,
            next_image: 0,
            params: vec![Vec::new(); image_count as usize],
            resources: resources.clone(),
        });

        log::debug!(
            "Simulated device {device}: provisioned {} rows at offset {} with {image_count} images",
            slice.amount,
            slice.offset
        );
        Ok(resources)
    }

    fn destroy_frame_resources(&mut self, resources: FrameResources) -> Result<(), DeviceError> {
        let device = self.index();
        let slots = self
            .slots
            .take()
            .ok_or(DeviceError::NotProvisioned { device })?;
        if slots.resources != resources {
            let reason = "resources do not belong to this device".to_string();
            self.slots = Some(slots);
            return Err(DeviceError::ProvisionFailed { device, reason });
        }

        self.drain();
        let mut state = self.shared.lock();
        state.fences.clear();
        state.semaphores.clear();
        state.images.clear();
        state.stats.current_rows = None;
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        signal: SemaphoreHandle,
        timeout: Duration,
    ) -> Result<u32, GpuSyncError> {
        let device = self.index();
        let failure = |reason: String| GpuSyncError::AcquireFailure { device, reason };
        let slots = self
            .slots
            .as_mut()
            .ok_or_else(|| failure("frame resources are not provisioned".to_string()))?;

        let guard = self.shared.lock();
        match guard.semaphores.get(&signal) {
            Some(SemaphoreState::Unsignaled) => {}
            Some(other) => {
                return Err(failure(format!(
                    "semaphore {signal:?} is {other:?}, cannot be signaled by acquire"
                )))
            }
            None => return Err(failure(format!("unknown semaphore {signal:?}"))),
        }

        let slot = slots.next_image;
        let (mut state, ready) = self.shared.wait_for(guard, timeout, |state| {
            state.images.get(slot as usize) == Some(&ImageState::Available)
        });
        if !ready {
            return Err(failure(format!(
                "image {slot} did not become available within {timeout:?}"
            )));
        }

        state.images[slot as usize] = ImageState::Acquired;
        state.semaphores.insert(signal, SemaphoreState::Signaled);
        slots.next_image = (slot + 1) % slots.image_count;
        Ok(slot)
    }

    fn wait_for_fence(
        &self,
        fence: FenceHandle,
        timeout: Duration,
    ) -> Result<FenceStatus, GpuSyncError> {
        let guard = self.shared.lock();
        if !guard.fences.contains_key(&fence) {
            return Err(GpuSyncError::SubmitFailure {
                device: self.index(),
                reason: format!("unknown fence {fence:?}"),
            });
        }
        let (_guard, signaled) = self.shared.wait_for(guard, timeout, |state| {
            state.fences.get(&fence).copied().unwrap_or(false)
        });
        Ok(if signaled {
            FenceStatus::Signaled
        } else {
            FenceStatus::TimedOut
        })
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GpuSyncError> {
        let mut state = self.shared.lock();
        match state.fences.get_mut(&fence) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(GpuSyncError::SubmitFailure {
                device: self.index(),
                reason: format!("unknown fence {fence:?}"),
            }),
        }
    }

    fn write_frame_params(&mut self, slot: u32, params: &FrameParams) -> Result<(), GpuSyncError> {
        let device = self.index();
        let entry = self
            .slots
            .as_mut()
            .and_then(|slots| slots.params.get_mut(slot as usize))
            .ok_or_else(|| GpuSyncError::SubmitFailure {
                device,
                reason: format!("no parameter storage for slot {slot}"),
            })?;
        entry.clear();
        entry.extend_from_slice(params.as_bytes());
        Ok(())
    }

    fn submit(&mut self, submission: Submission) -> Result<(), GpuSyncError> {
        let device = self.index();
        let failure = |reason: String| GpuSyncError::SubmitFailure { device, reason };

        if let Some(limit) = self.config.fail_submit_after {
            if self.accepted_submissions >= limit {
                return Err(failure(format!("injected failure after {limit} submissions")));
            }
        }

        let Submission {
            slot,
            wait,
            signal,
            fence,
        } = submission;
        let slots = self
            .slots
            .as_ref()
            .ok_or_else(|| failure("frame resources are not provisioned".to_string()))?;
        let params = slots
            .params
            .get(slot as usize)
            .and_then(|bytes| FrameParams::from_bytes(bytes))
            .ok_or_else(|| failure(format!("no parameters written for slot {slot}")))?;
        let rows = slots.rows;
        let cost = self.config.render_cost(rows, params.samples_per_render_call);

        {
            let mut state = self.shared.lock();
            if state.images.get(slot as usize) != Some(&ImageState::Acquired) {
                return Err(failure(format!("slot {slot} was not acquired")));
            }
            if state.semaphores.get(&wait) != Some(&SemaphoreState::Signaled) {
                return Err(failure(format!("wait semaphore {wait:?} is not signaled")));
            }
            if state.semaphores.get(&signal) != Some(&SemaphoreState::Unsignaled) {
                return Err(failure(format!("signal semaphore {signal:?} is still in use")));
            }
            if state.fences.get(&fence) != Some(&false) {
                return Err(failure(format!("fence {fence:?} was not reset")));
            }
            state.images[slot as usize] = ImageState::Queued;
            state.semaphores.insert(wait, SemaphoreState::Waiting);
            state.semaphores.insert(signal, SemaphoreState::Pending);
        }

        self.enqueue(Command::Render {
            slot,
            wait,
            signal,
            fence,
            cost,
            rows,
            params,
        })
        .map_err(failure)?;
        self.accepted_submissions += 1;
        Ok(())
    }

    fn present(&mut self, slot: u32, wait: SemaphoreHandle) -> Result<(), GpuSyncError> {
        let device = self.index();
        let failure = |reason: String| GpuSyncError::PresentFailure { device, reason };

        if let Some(limit) = self.config.fail_present_after {
            if self.accepted_presents >= limit {
                return Err(failure(format!("injected failure after {limit} presents")));
            }
        }
        {
            let state = self.shared.lock();
            if state.images.get(slot as usize) != Some(&ImageState::Queued) {
                return Err(failure(format!("slot {slot} has no submitted work")));
            }
            match state.semaphores.get(&wait) {
                Some(SemaphoreState::Pending | SemaphoreState::Signaled) => {}
                other => {
                    return Err(failure(format!(
                        "wait semaphore {wait:?} will never be signaled ({other:?})"
                    )))
                }
            }
        }
        self.enqueue(Command::Present { slot, wait }).map_err(failure)?;
        self.accepted_presents += 1;
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), GpuSyncError> {
        self.drain();
        Ok(())
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        // Closing the queue stops the worker once it has drained.
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Simulated device {}: worker panicked", self.info.index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{SyncPool, INFINITE_TIMEOUT};

    fn slice(amount: u32) -> DeviceSlice {
        DeviceSlice {
            index: 0,
            amount,
            offset: 0,
        }
    }

    fn fast_device(images: u32) -> SimulatedDevice {
        let config = SimulatedDeviceConfig {
            render_image_count: images,
            ..SimulatedDeviceConfig::new("test", 1e9)
        };
        SimulatedDevice::new(0, config).unwrap()
    }

    fn params() -> FrameParams {
        FrameParams::for_slice(&slice(8), [4, 8], 1, 0, 0)
    }

    #[test]
    fn test_resources_have_one_spare_acquire_semaphore() {
        let mut device = fast_device(3);
        let resources = device.create_frame_resources(&slice(8), [4, 8]).unwrap();
        assert_eq!(resources.render_image_count(), 3);
        assert_eq!(resources.acquire_semaphores.len(), 4);
        assert_eq!(resources.render_semaphores.len(), 3);

        // Fences start signaled.
        for &fence in &resources.fences {
            assert_eq!(
                device.wait_for_fence(fence, Duration::ZERO).unwrap(),
                FenceStatus::Signaled
            );
        }
        device.destroy_frame_resources(resources).unwrap();
    }

    #[test]
    fn test_cannot_provision_twice_or_destroy_foreign_resources() {
        let mut device = fast_device(2);
        let resources = device.create_frame_resources(&slice(8), [4, 8]).unwrap();
        assert!(device.create_frame_resources(&slice(8), [4, 8]).is_err());

        let mut foreign = resources.clone();
        foreign.fences.push(FenceHandle(999));
        assert!(device.destroy_frame_resources(foreign).is_err());
        device.destroy_frame_resources(resources.clone()).unwrap();
        assert_eq!(
            device.destroy_frame_resources(resources),
            Err(DeviceError::NotProvisioned { device: 0 })
        );
    }

    #[test]
    fn test_full_cycle_with_pool() {
        let mut device = fast_device(2);
        let resources = device.create_frame_resources(&slice(8), [4, 8]).unwrap();
        let mut pool = SyncPool::new(0, resources.fences.clone(), resources.acquire_semaphores.clone()).unwrap();

        for _ in 0..20 {
            let signal = pool.acquire_semaphore();
            let slot = device.acquire_next_image(signal, INFINITE_TIMEOUT).unwrap();
            pool.release(slot).unwrap();
            pool.wait_and_reset_fence(&device, slot, INFINITE_TIMEOUT).unwrap();
            device.write_frame_params(slot, &params()).unwrap();
            let render = resources.render_semaphores[slot as usize];
            device
                .submit(Submission {
                    slot,
                    wait: pool.slot_semaphore(slot).unwrap(),
                    signal: render,
                    fence: pool.fence(slot).unwrap(),
                })
                .unwrap();
            device.present(slot, render).unwrap();
        }
        device.wait_idle().unwrap();

        let stats = device.monitor().stats();
        assert_eq!(stats.submissions, 20);
        assert_eq!(stats.presents, 20);
        assert_eq!(stats.rows_rendered, 160);
        device.destroy_frame_resources(resources).unwrap();
    }

    #[test]
    fn test_submission_renders_the_uploaded_parameter_bytes() {
        let mut device = fast_device(2);
        let monitor = device.monitor();
        let resources = device.create_frame_resources(&slice(8), [4, 8]).unwrap();
        let semaphore = resources.acquire_semaphores[0];
        let slot = device.acquire_next_image(semaphore, INFINITE_TIMEOUT).unwrap();
        device.reset_fence(resources.fences[slot as usize]).unwrap();

        let written = params().with_cursor(Some((250.0, -125.0)));
        device.write_frame_params(slot, &written).unwrap();
        device
            .submit(Submission {
                slot,
                wait: semaphore,
                signal: resources.render_semaphores[slot as usize],
                fence: resources.fences[slot as usize],
            })
            .unwrap();
        device.wait_idle().unwrap();

        assert_eq!(monitor.stats().last_params, Some(written));
    }

    #[test]
    fn test_reusing_an_awaited_semaphore_is_rejected() {
        let mut device = SimulatedDevice::new(
            0,
            SimulatedDeviceConfig {
                render_image_count: 2,
                ..SimulatedDeviceConfig::new("slow", 80.0)
            },
        )
        .unwrap();
        let resources = device.create_frame_resources(&slice(8), [4, 8]).unwrap();
        let semaphore = resources.acquire_semaphores[0];

        let slot = device.acquire_next_image(semaphore, INFINITE_TIMEOUT).unwrap();
        device.reset_fence(resources.fences[slot as usize]).unwrap();
        device.write_frame_params(slot, &params()).unwrap();
        device
            .submit(Submission {
                slot,
                wait: semaphore,
                signal: resources.render_semaphores[slot as usize],
                fence: resources.fences[slot as usize],
            })
            .unwrap();

        // The submission above is still waiting on the semaphore (100 ms of work).
        let err = device.acquire_next_image(semaphore, INFINITE_TIMEOUT).unwrap_err();
        assert!(matches!(err, GpuSyncError::AcquireFailure { device: 0, .. }));
        device.wait_idle().unwrap();
    }

    #[test]
    fn test_submit_requires_reset_fence_and_params() {
        let mut device = fast_device(2);
        let resources = device.create_frame_resources(&slice(8), [4, 8]).unwrap();
        let semaphore = resources.acquire_semaphores[2];
        let slot = device.acquire_next_image(semaphore, INFINITE_TIMEOUT).unwrap();
        let submission = Submission {
            slot,
            wait: semaphore,
            signal: resources.render_semaphores[slot as usize],
            fence: resources.fences[slot as usize],
        };

        let err = device.submit(submission).unwrap_err();
        assert!(matches!(err, GpuSyncError::SubmitFailure { .. }), "{err}");

        device.write_frame_params(slot, &params()).unwrap();
        let err = device.submit(submission).unwrap_err();
        assert!(err.to_string().contains("not reset"), "{err}");

        device.reset_fence(submission.fence).unwrap();
        device.submit(submission).unwrap();
        device.present(slot, submission.signal).unwrap();
        device.wait_idle().unwrap();
    }

    #[test]
    fn test_fence_wait_times_out_while_work_runs() {
        let mut device = SimulatedDevice::new(0, SimulatedDeviceConfig::new("slow", 40.0)).unwrap();
        let resources = device.create_frame_resources(&slice(8), [4, 8]).unwrap();
        let semaphore = resources.acquire_semaphores[0];
        let slot = device.acquire_next_image(semaphore, INFINITE_TIMEOUT).unwrap();
        let fence = resources.fences[slot as usize];
        device.reset_fence(fence).unwrap();
        device.write_frame_params(slot, &params()).unwrap();
        device
            .submit(Submission {
                slot,
                wait: semaphore,
                signal: resources.render_semaphores[slot as usize],
                fence,
            })
            .unwrap();

        assert_eq!(
            device.wait_for_fence(fence, Duration::from_millis(1)).unwrap(),
            FenceStatus::TimedOut
        );
        assert_eq!(
            device.wait_for_fence(fence, INFINITE_TIMEOUT).unwrap(),
            FenceStatus::Signaled
        );
    }

    #[test]
    fn test_injected_submit_failure() {
        let mut device = SimulatedDevice::new(
            3,
            SimulatedDeviceConfig {
                fail_submit_after: Some(0),
                ..SimulatedDeviceConfig::new("flaky", 1e9)
            },
        )
        .unwrap();
        let resources = device.create_frame_resources(&slice(4), [4, 4]).unwrap();
        let err = device
            .submit(Submission {
                slot: 0,
                wait: resources.acquire_semaphores[0],
                signal: resources.render_semaphores[0],
                fence: resources.fences[0],
            })
            .unwrap_err();
        assert_eq!(err.device(), 3);
    }

    #[test]
    fn test_injected_present_failure() {
        let mut device = SimulatedDevice::new(
            2,
            SimulatedDeviceConfig {
                fail_present_after: Some(0),
                ..SimulatedDeviceConfig::new("flaky", 1e9)
            },
        )
        .unwrap();
        let monitor = device.monitor();
        let resources = device.create_frame_resources(&slice(4), [4, 4]).unwrap();
        let semaphore = resources.acquire_semaphores[0];
        let slot = device.acquire_next_image(semaphore, INFINITE_TIMEOUT).unwrap();
        device.reset_fence(resources.fences[slot as usize]).unwrap();
        device.write_frame_params(slot, &params()).unwrap();
        let signal = resources.render_semaphores[slot as usize];
        device
            .submit(Submission {
                slot,
                wait: semaphore,
                signal,
                fence: resources.fences[slot as usize],
            })
            .unwrap();

        let err = device.present(slot, signal).unwrap_err();
        assert!(matches!(err, GpuSyncError::PresentFailure { device: 2, .. }));
        device.wait_idle().unwrap();
        assert_eq!(monitor.stats().presents, 0);
    }
}
