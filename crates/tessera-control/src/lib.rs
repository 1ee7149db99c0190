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

//! # Tessera Control
//!
//! The feedback half of the render loop. Frame timings flow in through the
//! [`EpochAccumulator`], get folded into a bounded [`TunerState`] history, and
//! the [`WorkloadTuner`] decides once per epoch whether and how the workload
//! partition should change.

#![warn(missing_docs)]

pub mod analysis;
pub mod epoch;
pub mod history;
pub mod tuner;

pub use analysis::{analyze_imbalance, ImbalanceReport, DEFAULT_VARIANCE_THRESHOLD};
pub use epoch::{next_epoch_length, EpochAccumulator, EpochSummary};
pub use history::{FrameInfo, TunerState, DEFAULT_HISTORY_LIMIT};
pub use tuner::{decide, perturb, proportional_rebalance, TunerConfig, TuningOutcome, WorkloadTuner};
