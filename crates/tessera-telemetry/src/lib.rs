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

//! # Tessera Telemetry
//!
//! Stores the metrics produced by a render session. A [`MetricsRegistry`] hands
//! out cheap typed handles over a pluggable [`MetricsBackend`], and
//! [`SessionTelemetry`] wires up the metrics the orchestrator reports.

#![warn(missing_docs)]

pub mod metrics;
pub mod service;
pub mod storage;
pub mod utils;

pub use metrics::registry::{CounterHandle, GaugeHandle, HistogramHandle, MetricsRegistry};
pub use service::{SessionTelemetry, TelemetrySummary};
pub use storage::{backend::MetricsBackend, memory_backend::InMemoryBackend};
pub use utils::timer::ScopedMetricTimer;
