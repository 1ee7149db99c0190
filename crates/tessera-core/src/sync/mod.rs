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

//! Synchronization primitives for the frame pipeline.
//!
//! Backends hand out opaque handles; the core only ever moves them around and
//! never inspects them.

mod pool;

use std::time::Duration;

pub use self::pool::SyncPool;

/// Timeout used for fence waits and image acquisition: effectively unbounded.
pub const INFINITE_TIMEOUT: Duration = Duration::from_nanos(u64::MAX);

/// An opaque handle to a backend binary semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemaphoreHandle(pub u32);

/// An opaque handle to a backend fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FenceHandle(pub u32);

/// The observed state of a fence after a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence signaled before the timeout elapsed.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
}
