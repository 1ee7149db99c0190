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

//! The public-facing entry point for adaptive multi-device rendering.
//!
//! A [`RenderSession`] splits the rows of one image across every
//! [`RenderDevice`], renders frames in epochs and lets the workload tuner
//! move rows between devices whenever their estimated GPU times drift apart.

pub mod config;
pub mod frame;
pub mod session;

pub use config::SessionConfig;
pub use frame::DeviceLane;
pub use session::{run_session, RenderSession, SessionReport};

pub use tessera_control::{FrameInfo, TunerConfig};
pub use tessera_core::telemetry::SessionEvent;
pub use tessera_core::{HostControl, Partition, RenderDevice, SessionError, TuningMode};
pub use tessera_telemetry::TelemetrySummary;
