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

//! Per-device pool of fences and image-acquire semaphores.

use super::{FenceHandle, FenceStatus, SemaphoreHandle};
use crate::device::RenderDevice;
use crate::error::{DeviceError, GpuSyncError};
use std::time::Duration;

/// Owns one fence per render-image slot and `slots + 1` acquire semaphores.
///
/// Each slot is bound to one semaphore and exactly one semaphore is free at any
/// time. Acquisition always signals the free semaphore; once the backend tells
/// us which slot it filled, [`SyncPool::release`] swaps the free semaphore into
/// that slot and the slot's previous semaphore becomes the new free one. The
/// previous semaphore is safe to reuse: the slot was only handed back after its
/// last present, which waited for the submission that consumed that semaphore.
///
/// The binding table always stays a permutation of `0..=slots`.
#[derive(Debug)]
pub struct SyncPool {
    device: usize,
    fences: Vec<FenceHandle>,
    semaphores: Vec<SemaphoreHandle>,
    bindings: Vec<usize>,
    free: usize,
}

impl SyncPool {
    /// Builds a pool for `device` from backend-created handles.
    ///
    /// `semaphores` must hold exactly one more handle than `fences`, and there
    /// must be at least one render-image slot.
    pub fn new(
        device: usize,
        fences: Vec<FenceHandle>,
        semaphores: Vec<SemaphoreHandle>,
    ) -> Result<Self, DeviceError> {
        let rejection = if fences.is_empty() {
            Some("no render-image slots".to_string())
        } else if semaphores.len() != fences.len() + 1 {
            Some(format!(
                "expected {} acquire semaphores for {} slots, got {}",
                fences.len() + 1,
                fences.len(),
                semaphores.len()
            ))
        } else {
            None
        };
        if let Some(reason) = rejection {
            log::warn!("SyncPool: rejecting resources of device {device}: {reason}");
            return Err(DeviceError::ProvisionFailed { device, reason });
        }

        let slots = fences.len();
        log::trace!("SyncPool: device {device} pooled {slots} slots");
        Ok(Self {
            device,
            fences,
            semaphores,
            bindings: (0..slots).collect(),
            free: slots,
        })
    }

    /// Number of render-image slots managed by this pool.
    pub fn render_image_count(&self) -> u32 {
        self.fences.len() as u32
    }

    /// The semaphore the next image acquisition must signal.
    pub fn acquire_semaphore(&self) -> SemaphoreHandle {
        self.semaphores[self.free]
    }

    /// Rebinds the free semaphore to `slot` after an acquisition returned it.
    pub fn release(&mut self, slot: u32) -> Result<(), GpuSyncError> {
        let bound = self
            .bindings
            .get_mut(slot as usize)
            .ok_or_else(|| GpuSyncError::AcquireFailure {
                device: self.device,
                reason: format!(
                    "backend returned slot {slot} but only {} slots exist",
                    self.fences.len()
                ),
            })?;
        std::mem::swap(bound, &mut self.free);
        Ok(())
    }

    /// The semaphore currently bound to `slot`.
    ///
    /// Right after [`SyncPool::release`], this is the semaphore the acquisition
    /// signaled, i.e. the one the submission must wait on.
    pub fn slot_semaphore(&self, slot: u32) -> Option<SemaphoreHandle> {
        self.bindings
            .get(slot as usize)
            .map(|&index| self.semaphores[index])
    }

    /// The fence guarding `slot`.
    pub fn fence(&self, slot: u32) -> Option<FenceHandle> {
        self.fences.get(slot as usize).copied()
    }

    /// Blocks until the fence for `slot` signals, then resets it.
    ///
    /// A timeout is fatal and reported as [`GpuSyncError::FenceTimeout`].
    pub fn wait_and_reset_fence(
        &self,
        device: &dyn RenderDevice,
        slot: u32,
        timeout: Duration,
    ) -> Result<(), GpuSyncError> {
        let fence = self.fence(slot).ok_or_else(|| GpuSyncError::AcquireFailure {
            device: self.device,
            reason: format!("no fence for slot {slot}"),
        })?;

        match device.wait_for_fence(fence, timeout)? {
            FenceStatus::Signaled => device.reset_fence(fence),
            FenceStatus::TimedOut => {
                log::error!(
                    "SyncPool: fence of slot {slot} on device {} did not signal within {timeout:?}",
                    self.device
                );
                Err(GpuSyncError::FenceTimeout {
                    device: self.device,
                    slot,
                    timeout,
                })
            }
        }
    }

    /// Index of the currently free semaphore.
    pub fn free_index(&self) -> usize {
        self.free
    }

    /// Slot-to-semaphore binding table.
    pub fn bindings(&self) -> &[usize] {
        &self.bindings
    }

    /// Returns `true` if the bindings plus the free index cover every semaphore
    /// exactly once.
    pub fn is_consistent(&self) -> bool {
        let mut seen = vec![false; self.semaphores.len()];
        for &index in self.bindings.iter().chain(std::iter::once(&self.free)) {
            match seen.get_mut(index) {
                Some(flag) if !*flag => *flag = true,
                _ => return false,
            }
        }
        seen.into_iter().all(|flag| flag)
    }

    /// Consumes the pool and hands the handles back for destruction.
    pub fn into_handles(self) -> (Vec<FenceHandle>, Vec<SemaphoreHandle>) {
        (self.fences, self.semaphores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceInfo, FrameResources, Submission};
    use crate::params::FrameParams;
    use crate::sync::INFINITE_TIMEOUT;
    use crate::workload::DeviceSlice;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::cell::Cell;

    fn pool(slots: u32) -> SyncPool {
        SyncPool::new(
            0,
            (0..slots).map(FenceHandle).collect(),
            (0..=slots).map(SemaphoreHandle).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_pool_binds_identity_and_frees_last() {
        let pool = pool(3);
        assert_eq!(pool.bindings(), &[0, 1, 2]);
        assert_eq!(pool.free_index(), 3);
        assert_eq!(pool.acquire_semaphore(), SemaphoreHandle(3));
        assert!(pool.is_consistent());
    }

    #[test]
    fn test_new_rejects_wrong_semaphore_count() {
        let err = SyncPool::new(
            2,
            vec![FenceHandle(0), FenceHandle(1)],
            vec![SemaphoreHandle(0), SemaphoreHandle(1)],
        )
        .unwrap_err();
        assert!(matches!(err, DeviceError::ProvisionFailed { device: 2, .. }));

        assert!(SyncPool::new(0, Vec::new(), vec![SemaphoreHandle(0)]).is_err());
    }

    #[test]
    fn test_release_swaps_free_into_slot() {
        let mut pool = pool(2);
        let signaled = pool.acquire_semaphore();
        pool.release(1).unwrap();

        assert_eq!(pool.slot_semaphore(1), Some(signaled));
        assert_eq!(pool.free_index(), 1);
        assert_eq!(pool.acquire_semaphore(), SemaphoreHandle(1));
        assert!(pool.is_consistent());
    }

    #[test]
    fn test_release_out_of_range_slot_is_an_acquire_failure() {
        let mut pool = pool(2);
        let err = pool.release(5).unwrap_err();
        assert!(matches!(err, GpuSyncError::AcquireFailure { device: 0, .. }));
        assert!(pool.is_consistent());
    }

    #[test]
    fn test_bindings_stay_a_permutation_over_many_cycles() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for slots in 1..=4u32 {
            let mut pool = pool(slots);
            for _ in 0..10_000 {
                let slot = rng.gen_range(0..slots);
                let signaled = pool.acquire_semaphore();
                pool.release(slot).unwrap();
                assert_eq!(pool.slot_semaphore(slot), Some(signaled));
                assert!(pool.is_consistent());
            }
        }
    }

    /// A device whose fences always report `status`.
    #[derive(Debug)]
    struct FenceStub {
        info: DeviceInfo,
        status: FenceStatus,
        resets: Cell<u32>,
    }

    impl FenceStub {
        fn new(status: FenceStatus) -> Self {
            Self {
                info: DeviceInfo {
                    index: 0,
                    name: "stub".to_string(),
                },
                status,
                resets: Cell::new(0),
            }
        }
    }

    impl RenderDevice for FenceStub {
        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn create_frame_resources(
            &mut self,
            _slice: &DeviceSlice,
            _image_size: [u32; 2],
        ) -> Result<FrameResources, DeviceError> {
            Err(DeviceError::NotProvisioned { device: 0 })
        }

        fn destroy_frame_resources(&mut self, _resources: FrameResources) -> Result<(), DeviceError> {
            Ok(())
        }

        fn acquire_next_image(
            &mut self,
            _signal: SemaphoreHandle,
            _timeout: Duration,
        ) -> Result<u32, GpuSyncError> {
            Ok(0)
        }

        fn wait_for_fence(
            &self,
            _fence: FenceHandle,
            _timeout: Duration,
        ) -> Result<FenceStatus, GpuSyncError> {
            Ok(self.status)
        }

        fn reset_fence(&self, _fence: FenceHandle) -> Result<(), GpuSyncError> {
            self.resets.set(self.resets.get() + 1);
            Ok(())
        }

        fn write_frame_params(&mut self, _slot: u32, _params: &FrameParams) -> Result<(), GpuSyncError> {
            Ok(())
        }

        fn submit(&mut self, _submission: Submission) -> Result<(), GpuSyncError> {
            Ok(())
        }

        fn present(&mut self, _slot: u32, _wait: SemaphoreHandle) -> Result<(), GpuSyncError> {
            Ok(())
        }

        fn wait_idle(&mut self) -> Result<(), GpuSyncError> {
            Ok(())
        }
    }

    #[test]
    fn test_signaled_fence_is_reset() {
        let device = FenceStub::new(FenceStatus::Signaled);
        pool(2)
            .wait_and_reset_fence(&device, 1, INFINITE_TIMEOUT)
            .unwrap();
        assert_eq!(device.resets.get(), 1);
    }

    #[test]
    fn test_fence_that_never_signals_is_a_timeout() {
        let device = FenceStub::new(FenceStatus::TimedOut);
        let timeout = Duration::from_millis(5);

        let err = pool(2).wait_and_reset_fence(&device, 1, timeout).unwrap_err();

        assert_eq!(
            err,
            GpuSyncError::FenceTimeout {
                device: 0,
                slot: 1,
                timeout
            }
        );
        assert_eq!(device.resets.get(), 0);
    }

    #[test]
    fn test_fence_wait_on_unknown_slot_fails() {
        let device = FenceStub::new(FenceStatus::Signaled);
        let err = pool(2)
            .wait_and_reset_fence(&device, 7, INFINITE_TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, GpuSyncError::AcquireFailure { device: 0, .. }));
        assert_eq!(device.resets.get(), 0);
    }
}
