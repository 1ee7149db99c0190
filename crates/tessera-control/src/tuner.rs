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

//! The workload tuner.
//!
//! Once per epoch the tuner looks at the newest sample and picks one of three
//! moves:
//!
//! 1. **Rebalance**: if the normalized variance of per-device GPU durations is
//!    above the threshold, split the workload in proportion to each device's
//!    measured throughput (`workload / duration`).
//! 2. **Perturb**: otherwise, with weight `perturb_weight`, start from the best
//!    partition in the retained history and move one unit between two random
//!    devices.
//! 3. **Hold**: with weight `hold_weight`, keep the current partition.
//!
//! [`decide`] is a pure function of its inputs plus the random source, so the
//! whole decision procedure can be driven deterministically in tests.

use crate::analysis::{analyze_imbalance, ImbalanceReport, DEFAULT_VARIANCE_THRESHOLD};
use crate::history::{FrameInfo, TunerState};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tessera_core::TuningMode;

/// Tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Normalized variance above which the tuner rebalances.
    pub variance_threshold: f64,
    /// Relative odds of a perturbation step when balanced.
    pub perturb_weight: u32,
    /// Relative odds of keeping the partition when balanced.
    pub hold_weight: u32,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            variance_threshold: DEFAULT_VARIANCE_THRESHOLD,
            perturb_weight: 2,
            hold_weight: 1,
        }
    }
}

/// The result of one tuning decision.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningOutcome {
    /// Which rule fired.
    pub mode: TuningMode,
    /// Per-device amounts for the next epoch, or `None` to keep the current ones.
    pub next: Option<Vec<u32>>,
    /// The imbalance measured on the newest sample.
    pub imbalance: ImbalanceReport,
    /// The history to carry into the next epoch.
    pub state: TunerState,
}

impl TuningOutcome {
    /// `true` if the caller must rebuild device resources for a new partition.
    pub fn repartition(&self) -> bool {
        self.next.is_some()
    }
}

/// Appends `latest` to `state` and decides the partition for the next epoch.
///
/// A rebalance also collapses the returned history to `latest`, so that
/// samples taken under the old balance never compete with the new one.
///
/// A perturbation emits a new partition too, but it does not compact the
/// history: every repartition other than a rebalance keeps the retained
/// samples, so the next perturbation still starts from the best partition
/// measured since the last rebalance.
pub fn decide<R: Rng + ?Sized>(
    state: &TunerState,
    latest: FrameInfo,
    config: &TunerConfig,
    rng: &mut R,
) -> TuningOutcome {
    let mut next_state = state.clone();
    let imbalance = analyze_imbalance(&latest.estimated_gpu_duration, config.variance_threshold);
    next_state.add_frame_info(latest);

    let hold = |state: TunerState| TuningOutcome {
        mode: TuningMode::Hold,
        next: None,
        imbalance,
        state,
    };

    if next_state.device_count() < 2 {
        return hold(next_state);
    }

    // ── 1. Rebalance ──────────────────────────────────────────────────
    if imbalance.needs_rebalance {
        let next = match next_state.latest() {
            Some(latest) => proportional_rebalance(
                &latest.workload_distribution,
                &latest.estimated_gpu_duration,
                next_state.total_workload(),
            ),
            None => return hold(next_state),
        };
        log::debug!(
            "Tuner: variance {:.3} > {:.3}, rebalancing to {:?}",
            imbalance.variance,
            config.variance_threshold,
            next
        );
        next_state.compact();
        return TuningOutcome {
            mode: TuningMode::Rebalance,
            next: Some(next),
            imbalance,
            state: next_state,
        };
    }

    // ── 2. Explore ────────────────────────────────────────────────────
    let weights = config.perturb_weight + config.hold_weight;
    if weights == 0 || rng.gen_range(0..weights) >= config.perturb_weight {
        log::debug!("Tuner: variance {:.3}, holding partition", imbalance.variance);
        return hold(next_state);
    }

    let Some(best) = next_state.best() else {
        return hold(next_state);
    };
    let next = perturb(&best.workload_distribution, rng);
    log::debug!(
        "Tuner: variance {:.3}, perturbing best partition to {:?}",
        imbalance.variance,
        next
    );
    TuningOutcome {
        mode: TuningMode::Perturb,
        next: Some(next),
        imbalance,
        state: next_state,
    }
}

/// Splits `total` in proportion to each device's throughput.
///
/// Flooring losses go one unit each to the lowest-indexed devices. Any device
/// left at zero then takes one unit from the largest allocation.
pub fn proportional_rebalance(workload: &[u32], durations: &[Duration], total: u32) -> Vec<u32> {
    let throughput: Vec<f64> = workload
        .iter()
        .zip(durations)
        .map(|(&amount, duration)| f64::from(amount) / duration.as_nanos().max(1) as f64)
        .collect();
    let total_throughput: f64 = throughput.iter().sum();
    if throughput.is_empty() || total_throughput <= 0.0 {
        return workload.to_vec();
    }

    let mut next: Vec<u32> = throughput
        .iter()
        .map(|v| (f64::from(total) * v / total_throughput).floor() as u32)
        .collect();

    let assigned: u64 = next.iter().map(|&n| u64::from(n)).sum();
    let mut remainder = u64::from(total).saturating_sub(assigned);
    let device_count = next.len();
    let mut index = 0;
    while remainder > 0 {
        next[index % device_count] += 1;
        remainder -= 1;
        index += 1;
    }

    ensure_minimum_share(&mut next);
    debug_assert_eq!(
        next.iter().map(|&n| u64::from(n)).sum::<u64>(),
        u64::from(total)
    );
    next
}

/// Moves one unit between two distinct random devices, if the donor can spare it.
pub fn perturb<R: Rng + ?Sized>(workload: &[u32], rng: &mut R) -> Vec<u32> {
    let mut next = workload.to_vec();
    if next.len() < 2 {
        return next;
    }
    let dec = rng.gen_range(0..next.len());
    let mut inc = rng.gen_range(0..next.len() - 1);
    if inc >= dec {
        inc += 1;
    }
    if next[dec] > 1 {
        next[dec] -= 1;
        next[inc] += 1;
    }
    next
}

fn ensure_minimum_share(amounts: &mut [u32]) {
    for i in 0..amounts.len() {
        if amounts[i] > 0 {
            continue;
        }
        let donor = amounts
            .iter()
            .enumerate()
            .max_by_key(|&(index, &amount)| (amount, std::cmp::Reverse(index)))
            .map(|(index, _)| index);
        if let Some(donor) = donor.filter(|&d| amounts[d] > 1) {
            amounts[donor] -= 1;
            amounts[i] += 1;
        }
    }
}

/// A [`decide`] driver that owns its random source.
#[derive(Debug)]
pub struct WorkloadTuner {
    config: TunerConfig,
    rng: SmallRng,
}

impl WorkloadTuner {
    /// Creates a tuner. A `seed` makes every decision reproducible.
    pub fn new(config: TunerConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self { config, rng }
    }

    /// The active configuration.
    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// Decides the next partition, see [`decide`].
    pub fn decide(&mut self, state: &TunerState, latest: FrameInfo) -> TuningOutcome {
        decide(state, latest, &self.config, &mut self.rng)
    }
}
