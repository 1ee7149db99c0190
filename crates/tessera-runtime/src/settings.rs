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

//! Merges the optional TOML file with command-line overrides.

use crate::cli::Cli;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tessera_infra::SimulatedDeviceConfig;
use tessera_sdk::SessionConfig;

/// The contents of a runtime configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Session settings.
    pub session: SessionConfig,
    /// Devices to simulate, in index order.
    pub devices: Vec<SimulatedDeviceConfig>,
    /// Stop after this many frames.
    pub frames: Option<u64>,
    /// Stop after this many seconds.
    pub duration_secs: Option<f64>,
}

impl FileConfig {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parses TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Everything the runtime needs to start a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub session: SessionConfig,
    pub devices: Vec<SimulatedDeviceConfig>,
    pub frames: Option<u64>,
    pub duration: Option<Duration>,
}

/// Devices used when neither the file nor the command line names any.
pub fn default_devices() -> Vec<SimulatedDeviceConfig> {
    vec![
        SimulatedDeviceConfig::new("sim-discrete", 400_000.0),
        SimulatedDeviceConfig::new("sim-integrated", 120_000.0),
    ]
}

impl RunSettings {
    /// Command-line values win over file values.
    pub fn resolve(file: FileConfig, cli: &Cli) -> Result<Self> {
        let mut session = file.session;
        if let Some(width) = cli.width {
            session.width = width;
        }
        if let Some(height) = cli.height {
            session.height = height;
        }
        if let Some(samples) = cli.samples {
            session.total_samples = samples;
        }
        if let Some(spr) = cli.samples_per_render_call {
            session.samples_per_render_call = spr;
        }
        if cli.gpu_count.is_some() {
            session.device_limit = cli.gpu_count;
        }
        if cli.seed.is_some() {
            session.seed = cli.seed;
        }
        if let Some(threshold) = cli.variance_threshold {
            session.tuner.variance_threshold = threshold;
        }

        let devices = if !cli.devices.is_empty() {
            cli.devices.clone()
        } else if !file.devices.is_empty() {
            file.devices
        } else {
            default_devices()
        };

        let duration = cli
            .duration
            .or(file.duration_secs)
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("invalid duration of {secs} seconds"))
            })
            .transpose()?;

        Ok(Self {
            session,
            devices,
            frames: cli.frames.or(file.frames),
            duration,
        })
    }
}
