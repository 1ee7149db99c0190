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

//! Shared synchronization state and the per-device worker thread.

use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tessera_core::{FenceHandle, FrameParams, SemaphoreHandle};

/// Lifecycle of a binary semaphore as seen by the simulated queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SemaphoreState {
    /// Free to be signaled.
    Unsignaled,
    /// A queued operation will signal it.
    Pending,
    /// Signaled and not yet claimed by a waiter.
    Signaled,
    /// Claimed by a queued operation that has not executed yet.
    Waiting,
}

/// Where a swapchain image is in its acquire/render/present cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageState {
    /// Can be acquired.
    Available,
    /// Handed to the caller, not yet submitted.
    Acquired,
    /// Rendering submitted; present not yet executed.
    Queued,
}

/// Counters exposed through a [`super::DeviceMonitor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStats {
    /// Frame resources created so far.
    pub provisions: u64,
    /// Submissions executed by the worker.
    pub submissions: u64,
    /// Presents executed by the worker.
    pub presents: u64,
    /// Total rows rendered.
    pub rows_rendered: u64,
    /// Rows of the current slice, if provisioned.
    pub current_rows: Option<u32>,
    /// The parameter block of the most recent submission.
    pub last_params: Option<FrameParams>,
}

#[derive(Debug, Default)]
pub(crate) struct SyncState {
    pub fences: HashMap<FenceHandle, bool>,
    pub semaphores: HashMap<SemaphoreHandle, SemaphoreState>,
    pub images: Vec<ImageState>,
    pub in_flight: usize,
    pub stats: DeviceStats,
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: Mutex<SyncState>,
    changed: Condvar,
}

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until `ready` holds or `timeout` elapses. Returns the guard and
    /// whether the condition was met.
    pub fn wait_for<'a>(
        &self,
        mut guard: MutexGuard<'a, SyncState>,
        timeout: Duration,
        mut ready: impl FnMut(&SyncState) -> bool,
    ) -> (MutexGuard<'a, SyncState>, bool) {
        // Deadlines past the representable range mean "wait forever".
        let deadline = Instant::now().checked_add(timeout);
        while !ready(&guard) {
            match deadline {
                None => {
                    guard = self
                        .changed
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return (guard, false);
                    }
                    guard = self
                        .changed
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        (guard, true)
    }

    pub fn notify(&self) {
        self.changed.notify_all();
    }
}

/// Work queued on a device.
#[derive(Debug)]
pub(crate) enum Command {
    Render {
        slot: u32,
        wait: SemaphoreHandle,
        signal: SemaphoreHandle,
        fence: FenceHandle,
        cost: Duration,
        rows: u32,
        params: FrameParams,
    },
    Present {
        slot: u32,
        wait: SemaphoreHandle,
    },
}

/// Executes queued commands in order until the sending side is dropped.
pub(crate) fn run_worker(
    name: String,
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    present_latency: Duration,
) {
    log::debug!("Simulated device '{name}': worker started");
    for command in commands.iter() {
        match command {
            Command::Render {
                slot,
                wait,
                signal,
                fence,
                cost,
                rows,
                params,
            } => {
                if !cost.is_zero() {
                    thread::sleep(cost);
                }
                let mut state = shared.lock();
                state.semaphores.insert(wait, SemaphoreState::Unsignaled);
                state.semaphores.insert(signal, SemaphoreState::Signaled);
                state.fences.insert(fence, true);
                state.stats.submissions += 1;
                state.stats.rows_rendered += u64::from(rows);
                state.stats.last_params = Some(params);
                state.in_flight -= 1;
                log::trace!("Simulated device '{name}': slot {slot} rendered in {cost:?}");
            }
            Command::Present { slot, wait } => {
                if !present_latency.is_zero() {
                    thread::sleep(present_latency);
                }
                let mut state = shared.lock();
                state.semaphores.insert(wait, SemaphoreState::Unsignaled);
                if let Some(image) = state.images.get_mut(slot as usize) {
                    *image = ImageState::Available;
                }
                state.stats.presents += 1;
                state.in_flight -= 1;
            }
        }
        shared.notify();
    }
    log::debug!("Simulated device '{name}': worker stopped");
}
