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

//! Headless Tessera runtime.
//!
//! Spins up the configured simulated devices, renders until a frame or time
//! limit is reached or Ctrl-C is pressed, and prints how the rows ended up split.

mod cli;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use settings::{FileConfig, RunSettings};
use std::sync::atomic::Ordering;
use tessera_infra::{AnyHost, DeadlineHost, FrameLimitHost, SimulatedDevice, StopFlagHost};
use tessera_sdk::{run_session, RenderDevice, SessionReport};

fn build_host(settings: &RunSettings, interrupt: StopFlagHost) -> AnyHost {
    let mut host = AnyHost::new().with(interrupt);
    if let Some(frames) = settings.frames {
        host = host.with(FrameLimitHost::new(frames));
    }
    if let Some(duration) = settings.duration {
        host = host.with(DeadlineHost::after(duration));
    }
    if settings.frames.is_none() && settings.duration.is_none() {
        log::info!("Runtime: no --frames or --duration given, rendering until Ctrl-C");
    }
    host
}

fn install_interrupt_handler() -> Result<StopFlagHost> {
    let interrupt = StopFlagHost::new();
    let flag = interrupt.flag();
    ctrlc::set_handler(move || {
        log::info!("Runtime: interrupt received, stopping after this frame");
        flag.store(true, Ordering::Relaxed);
    })
    .context("failed to install the Ctrl-C handler")?;
    Ok(interrupt)
}

fn write_report(report: &SessionReport, cli: &Cli) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match &cli.report {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            log::info!("Runtime: report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = RunSettings::resolve(file, &cli)?;

    let devices: Vec<Box<dyn RenderDevice>> = SimulatedDevice::from_configs(settings.devices.clone())
        .context("failed to start simulated devices")?
        .into_iter()
        .map(|device| Box::new(device) as Box<dyn RenderDevice>)
        .collect();

    let mut host = build_host(&settings, install_interrupt_handler()?);
    let report = run_session(devices, &mut host, &settings.session)?;

    log::info!(
        "Runtime: {} frames, {} epochs, final split {:?}",
        report.frames_rendered,
        report.epochs_completed,
        report.final_partition
    );
    write_report(&report, &cli)
}
