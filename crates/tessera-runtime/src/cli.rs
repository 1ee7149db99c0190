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

//! Command-line arguments.

use clap::Parser;
use std::path::PathBuf;
use tessera_infra::SimulatedDeviceConfig;

/// Renders one image split across several devices, retuning the split as
/// the devices' timings drift apart.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML file with session settings and a `[[devices]]` list.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Image width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Image height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Samples per pixel of a converged image.
    #[arg(long)]
    pub samples: Option<u32>,

    /// Samples per pixel traced by one render call.
    #[arg(long)]
    pub samples_per_render_call: Option<u32>,

    /// Use at most this many devices.
    #[arg(long)]
    pub gpu_count: Option<usize>,

    /// A simulated device as `name:rows_per_second[:render_images]`; repeatable.
    #[arg(short, long = "device")]
    pub devices: Vec<SimulatedDeviceConfig>,

    /// Stop after this many frames.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Stop after this many seconds.
    #[arg(long)]
    pub duration: Option<f64>,

    /// Seed for the tuner's exploration.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Relative GPU-time variance above which the split is rebalanced.
    #[arg(long)]
    pub variance_threshold: Option<f64>,

    /// Write the session report as JSON to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,
}
