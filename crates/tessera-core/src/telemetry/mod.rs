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

//! Shared telemetry vocabulary.
//!
//! This module only defines what a metric or a session event looks like.
//! `tessera-telemetry` stores and aggregates them, and the orchestrator in
//! `tessera-sdk` produces them.

pub mod event;
pub mod metrics;

pub use self::event::SessionEvent;
pub use self::metrics::{
    Metric, MetricId, MetricMetadata, MetricType, MetricValue, MetricsError, MetricsResult,
};
