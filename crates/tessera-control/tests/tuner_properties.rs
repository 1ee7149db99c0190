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

//! Property checks for the tuner over randomized histories.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tessera_control::{decide, FrameInfo, TunerConfig, TunerState};
use tessera_core::{Partition, TuningMode};

fn random_split<R: Rng>(rng: &mut R, total: u32, devices: usize) -> Vec<u32> {
    let mut amounts = vec![1u32; devices];
    for _ in 0..(total as usize - devices) {
        amounts[rng.gen_range(0..devices)] += 1;
    }
    amounts
}

#[test]
fn next_workload_always_conserves_total_and_feeds_every_device() {
    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
    let config = TunerConfig::default();

    for _ in 0..500 {
        let devices = rng.gen_range(2..=6);
        let total = rng.gen_range(devices as u32..=2160);
        let mut state = TunerState::new(total, devices);
        let mut workload = random_split(&mut rng, total, devices);

        for _ in 0..15 {
            let sample = FrameInfo {
                workload_distribution: workload.clone(),
                duration: Duration::from_micros(rng.gen_range(1_000..50_000)),
                estimated_gpu_duration: (0..devices)
                    .map(|_| Duration::from_micros(rng.gen_range(0..80_000)))
                    .collect(),
            };
            let outcome = decide(&state, sample, &config, &mut rng);
            if let Some(next) = outcome.next {
                assert_eq!(next.iter().map(|&n| u64::from(n)).sum::<u64>(), u64::from(total));
                assert!(next.iter().all(|&n| n >= 1), "{next:?}");
                assert!(Partition::with_total(&next, total).is_ok());
                workload = next;
            }
            state = outcome.state;
            assert!(state.frame_infos().len() <= state.history_limit() + 1);
        }
    }
}

#[test]
fn balanced_devices_split_between_perturb_and_hold() {
    let mut rng = SmallRng::seed_from_u64(5);
    let state = TunerState::new(1080, 3);
    let mut perturbs = 0;
    let mut holds = 0;

    for _ in 0..3_000 {
        let sample = FrameInfo {
            workload_distribution: vec![360, 360, 360],
            duration: Duration::from_millis(12),
            estimated_gpu_duration: vec![Duration::from_millis(10); 3],
        };
        match decide(&state, sample, &TunerConfig::default(), &mut rng).mode {
            TuningMode::Perturb => perturbs += 1,
            TuningMode::Hold => holds += 1,
            TuningMode::Rebalance => panic!("balanced sample must not rebalance"),
        }
    }

    let ratio = perturbs as f64 / (perturbs + holds) as f64;
    assert!((0.6..0.73).contains(&ratio), "perturb ratio {ratio}");
}

#[test]
fn slow_device_loses_work_on_rebalance() {
    let state = TunerState::new(1080, 3);
    let config = TunerConfig {
        variance_threshold: 1.0,
        ..TunerConfig::default()
    };
    let mut rng = SmallRng::seed_from_u64(1);
    let sample = FrameInfo {
        workload_distribution: vec![360, 360, 360],
        duration: Duration::from_millis(42),
        estimated_gpu_duration: [10, 10, 40].map(Duration::from_millis).to_vec(),
    };

    let outcome = decide(&state, sample, &config, &mut rng);
    let next = outcome.next.expect("imbalanced sample must repartition");
    assert_eq!(outcome.mode, TuningMode::Rebalance);
    assert!(next[2] < 360);
    assert!(next[0] > 360 && next[1] > 360);
    assert_eq!(next.iter().sum::<u32>(), 1080);
}
