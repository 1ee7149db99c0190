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

//! The render loop: epochs of frames across all devices, with the workload
//! retuned between epochs.

use crate::config::SessionConfig;
use crate::frame::DeviceLane;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tessera_control::{next_epoch_length, EpochAccumulator, FrameInfo, TunerState, WorkloadTuner};
use tessera_core::telemetry::SessionEvent;
use tessera_core::{
    DeviceError, GpuSyncError, HostControl, Partition, RenderDevice, SessionError,
    INFINITE_TIMEOUT,
};
use tessera_telemetry::{SessionTelemetry, TelemetrySummary};

/// What a finished session did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    /// Device names, in index order.
    pub devices: Vec<String>,
    /// Frames rendered across all epochs.
    pub frames_rendered: u64,
    /// Epochs that ran to their full length.
    pub epochs_completed: u64,
    /// Tuner decisions that changed the partition.
    pub repartitions: u64,
    /// Rows per device when the session stopped.
    pub final_partition: Vec<u32>,
    /// The tuner history when the session stopped.
    pub history: Vec<FrameInfo>,
    /// Aggregated telemetry.
    pub telemetry: TelemetrySummary,
}

/// Drives a set of devices through the render loop.
#[derive(Debug)]
pub struct RenderSession {
    config: SessionConfig,
    lanes: Vec<DeviceLane>,
    partition: Partition,
    state: TunerState,
    tuner: WorkloadTuner,
    telemetry: SessionTelemetry,
    events: Option<Sender<SessionEvent>>,
    frames_rendered: u64,
    epochs_completed: u64,
    repartitions: u64,
}

impl RenderSession {
    /// Validates `config` and prepares a session over `devices`.
    ///
    /// Only the first `device_limit` devices take part. The image starts out
    /// split evenly across them.
    pub fn new(
        mut devices: Vec<Box<dyn RenderDevice>>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        if let Some(limit) = config.device_limit {
            devices.truncate(limit);
        }
        config.validate_device_count(devices.len())?;

        let device_count = devices.len();
        let partition = Partition::even(config.height, device_count)?;
        let state = TunerState::with_history_limit(config.height, device_count, config.history_limit);
        let tuner = WorkloadTuner::new(config.tuner.clone(), config.seed);
        let telemetry = SessionTelemetry::new(device_count)?;

        for device in &devices {
            let info = device.info();
            log::info!("Session: using device {} '{}'", info.index, info.name);
        }
        log::info!(
            "Session: {}x{} image, {} samples per render call, initial split {:?}",
            config.width,
            config.height,
            config.samples_per_render_call,
            partition.amounts()
        );

        Ok(Self {
            config,
            lanes: devices.into_iter().map(DeviceLane::new).collect(),
            partition,
            state,
            tuner,
            telemetry,
            events: None,
            frames_rendered: 0,
            epochs_completed: 0,
            repartitions: 0,
        })
    }

    /// Streams session events into a bounded channel.
    ///
    /// Events are dropped rather than blocking the render loop when the
    /// channel is full.
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.events = Some(tx);
        rx
    }

    /// The current partition.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// The tuner history.
    pub fn state(&self) -> &TunerState {
        &self.state
    }

    /// The session's telemetry.
    pub fn telemetry(&self) -> &SessionTelemetry {
        &self.telemetry
    }

    /// Renders until `host` asks to stop, then drains every device.
    ///
    /// The devices are drained and their resources destroyed even when the
    /// loop fails.
    pub fn run(&mut self, host: &mut dyn HostControl) -> Result<SessionReport, SessionError> {
        let result = self.render_loop(host);
        let drained = self.drain();

        self.emit(SessionEvent::Stopped {
            frames: self.frames_rendered,
            epochs: self.epochs_completed,
        });
        self.telemetry.log_summary();

        if let Err(err) = &result {
            log::error!("Session: render loop failed: {err}");
        }
        result?;
        drained?;
        Ok(self.report())
    }

    /// A snapshot of what the session has done so far.
    pub fn report(&self) -> SessionReport {
        SessionReport {
            devices: self.lanes.iter().map(|lane| lane.info().name.clone()).collect(),
            frames_rendered: self.frames_rendered,
            epochs_completed: self.epochs_completed,
            repartitions: self.repartitions,
            final_partition: self.partition.amounts(),
            history: self.state.frame_infos().to_vec(),
            telemetry: self.telemetry.summary(),
        }
    }

    fn render_loop(&mut self, host: &mut dyn HostControl) -> Result<(), SessionError> {
        self.provision_all()?;
        let mut epoch_frames = self.config.initial_epoch_frames;

        loop {
            // ── 1. Render one epoch under a fixed partition ───────────────
            let workload = self.partition.amounts();
            self.telemetry.record_epoch_length(epoch_frames);
            self.telemetry.record_workload(&workload);
            log::debug!("Session: epoch of {epoch_frames} frames with split {workload:?}");

            let mut epoch = EpochAccumulator::start(self.lanes.len());
            let epoch_start = Instant::now();
            for lane in &mut self.lanes {
                lane.reset_clock(epoch_start);
            }

            let mut stopped = false;
            while epoch.frames() < epoch_frames {
                if host.should_stop() {
                    stopped = true;
                    break;
                }
                {
                    let _timer = self.telemetry.frame_timer();
                    render_frame(
                        &mut self.lanes,
                        &self.config,
                        self.frames_rendered,
                        host.cursor_position(),
                    )?;
                }
                for (device, lane) in self.lanes.iter().enumerate() {
                    epoch.record_gpu_duration(device, lane.gpu_sample());
                }
                log::trace!(
                    "Session: frame {} gpu samples {:?}",
                    self.frames_rendered,
                    self.lanes.iter().map(DeviceLane::gpu_sample).collect::<Vec<_>>()
                );
                epoch.record_frame();
                self.frames_rendered += 1;
                self.telemetry.record_frame();
                host.poll_events();
            }

            // ── 2. Summarize it ──────────────────────────────────────────
            let Some(summary) = epoch.finish(workload.clone()) else {
                return Ok(());
            };
            let info = summary.info;
            if stopped {
                self.telemetry
                    .record_partial_epoch(info.duration, &info.estimated_gpu_duration);
                log::info!(
                    "Session: stopped after {} frames of an unfinished epoch",
                    summary.frames
                );
                return Ok(());
            }

            let epoch_index = self.epochs_completed;
            self.epochs_completed += 1;
            log::info!(
                "Session: epoch {epoch_index} done, {} frames at {:.3} ms/frame, gpu {:?}",
                summary.frames,
                info.duration.as_secs_f64() * 1e3,
                info.estimated_gpu_duration
            );
            self.telemetry
                .record_epoch(info.duration, &info.estimated_gpu_duration);
            self.emit(SessionEvent::EpochCompleted {
                epoch: epoch_index,
                frames: summary.frames,
                duration: info.duration,
                workload,
                estimated_gpu: info.estimated_gpu_duration.clone(),
            });
            epoch_frames = next_epoch_length(
                info.duration,
                self.config.target_window(),
                self.config.margin_frames,
                self.config.initial_epoch_frames,
            );

            // ── 3. Retune ────────────────────────────────────────────────
            let outcome = self.tuner.decide(&self.state, info);
            self.state = outcome.state;
            if let Some(next) = outcome.next {
                self.partition = Partition::with_total(&next, self.config.height)?;
                self.repartitions += 1;
                self.telemetry.record_repartition(outcome.mode);
                self.provision_all()?;
            }
            log::info!(
                "Session: {} (variance {:.3}), split {:?}, next epoch {epoch_frames} frames",
                outcome.mode.as_str(),
                outcome.imbalance.variance,
                self.partition.amounts()
            );
            self.emit(SessionEvent::Repartitioned {
                epoch: epoch_index,
                mode: outcome.mode,
                workload: self.partition.amounts(),
                next_epoch_frames: epoch_frames,
            });
        }
    }

    fn provision_all(&mut self) -> Result<(), DeviceError> {
        let image_size = [self.config.width, self.config.height];
        let slices = self.partition.slices();
        self.lanes
            .par_iter_mut()
            .zip(slices.par_iter())
            .try_for_each(|(lane, slice)| lane.provision(*slice, image_size))
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        let mut first_error = None;
        for lane in &mut self.lanes {
            if let Err(err) = lane.release_resources() {
                log::warn!("Session: failed to drain device {}: {err}", lane.info().index);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn emit(&mut self, event: SessionEvent) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::debug!("Session: event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Session: event subscriber went away");
                self.events = None;
            }
        }
    }
}

/// Runs one frame on every lane.
///
/// Acquisition with its fence wait, and submission with its present, run on
/// all devices in parallel. Parameter upload runs in between, device by device.
/// Acquisition and fence waits block without a deadline.
fn render_frame(
    lanes: &mut [DeviceLane],
    config: &SessionConfig,
    frame: u64,
    cursor: Option<(f64, f64)>,
) -> Result<(), GpuSyncError> {
    let timeout = INFINITE_TIMEOUT;
    let image_size = [config.width, config.height];
    let number = (frame % u64::from(config.render_calls_per_image())) as u32;

    lanes.par_iter_mut().try_for_each(|lane| {
        lane.acquire(timeout)?;
        lane.wait_fence(timeout)
    })?;

    for lane in lanes.iter_mut() {
        let params = lane
            .frame_params(image_size, config.samples_per_render_call, number, frame)
            .ok_or_else(|| GpuSyncError::SubmitFailure {
                device: lane.info().index,
                reason: "no slice provisioned".to_string(),
            })?;
        lane.upload(&params.with_cursor(cursor))?;
    }

    lanes.par_iter_mut().try_for_each(|lane| {
        lane.submit()?;
        lane.present()
    })
}

/// Builds a session over `devices` and renders until `host` asks to stop.
pub fn run_session(
    devices: Vec<Box<dyn RenderDevice>>,
    host: &mut dyn HostControl,
    config: &SessionConfig,
) -> Result<SessionReport, SessionError> {
    RenderSession::new(devices, config.clone())?.run(host)
}
