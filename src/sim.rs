// SPDX-License-Identifier: GPL-3.0-only

//! Closed-loop simulation
//!
//! [`SimulatedSensor`] implements [`Sensor`] with configurable limits,
//! modes and gain quantization. [`SyntheticScene`] turns the exposure the
//! sensor applied into the luma grid and histogram the measurement unit
//! would report. [`run`] drives an [`AecController`] over a [`Scenario`].

use crate::aec::{AecController, AecInstance, AecState, HistogramBins, LumaGrid};
use crate::calibration::CalibrationDb;
use crate::config::AecConfig;
use crate::constants::{grid, histogram, scene};
use crate::errors::{AecResult, SensorError, SensorResult};
use crate::sensor::{
    AfpsInfo, AfpsStage, AppliedExposure, ResolutionId, ResolutionParams, Sensor,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// One selectable sensor mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMode {
    pub id: ResolutionId,
    pub width: u16,
    pub height: u16,
    pub fps: u16,
    /// Longest integration time this mode allows, seconds
    pub max_integration_time: f32,
}

impl SensorMode {
    pub fn params(&self) -> ResolutionParams {
        ResolutionParams {
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }
}

/// Static description of a simulated sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorModel {
    pub min_gain: f32,
    pub max_gain: f32,
    pub min_integration_time: f32,
    pub modes: Vec<SensorMode>,
    /// Index into `modes` the sensor starts in
    pub initial_mode: usize,
    /// Report the modes as an AFPS stage table
    pub afps: bool,
    /// Gain resolution; 0 applies gains unquantized
    pub gain_step: f32,
    pub frames_to_skip: u32,
}

impl Default for SensorModel {
    fn default() -> Self {
        Self {
            min_gain: 1.0,
            max_gain: 8.0,
            min_integration_time: 0.0001,
            modes: vec![SensorMode {
                id: ResolutionId(1),
                width: 640,
                height: 480,
                fps: 30,
                max_integration_time: 0.033,
            }],
            initial_mode: 0,
            afps: false,
            gain_step: 0.0,
            frames_to_skip: 1,
        }
    }
}

#[derive(Debug)]
struct SimState {
    model: SensorModel,
    mode: usize,
    gain: f32,
    integration_time: f32,
    applied: u32,
}

impl SimState {
    fn mode(&self) -> SensorResult<&SensorMode> {
        self.model
            .modes
            .get(self.mode)
            .ok_or_else(|| SensorError::Failure("sensor has no modes".to_string()))
    }
}

/// Sensor backed by a [`SensorModel`]
///
/// Clones share state, so a clone can be kept to observe the sensor or to
/// switch its mode from a resolution-change callback.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSensor {
    pub fn new(model: SensorModel) -> Self {
        let gain = model.min_gain;
        let mode = model.initial_mode.min(model.modes.len().saturating_sub(1));
        Self {
            state: Arc::new(Mutex::new(SimState {
                model,
                mode,
                gain,
                integration_time: 0.0,
                applied: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Switch to the mode with the given id
    pub fn set_resolution(&self, id: ResolutionId) -> SensorResult<()> {
        let mut state = self.lock();
        let index = state
            .model
            .modes
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| SensorError::InvalidValue(format!("unknown mode {}", id)))?;
        state.mode = index;
        let max_it = state.model.modes[index].max_integration_time;
        state.integration_time = state.integration_time.min(max_it);
        debug!(mode = %id, "Simulated sensor switched mode");
        Ok(())
    }

    /// Gain × integration time currently applied
    pub fn exposure(&self) -> f32 {
        let state = self.lock();
        state.gain * state.integration_time
    }

    /// Number of exposure updates received
    pub fn applied_count(&self) -> u32 {
        self.lock().applied
    }
}

impl Sensor for SimulatedSensor {
    fn gain_limits(&self) -> SensorResult<(f32, f32)> {
        let state = self.lock();
        Ok((state.model.min_gain, state.model.max_gain))
    }

    fn integration_time_limits(&self) -> SensorResult<(f32, f32)> {
        let state = self.lock();
        Ok((
            state.model.min_integration_time,
            state.mode()?.max_integration_time,
        ))
    }

    fn resolution(&self) -> SensorResult<ResolutionId> {
        Ok(self.lock().mode()?.id)
    }

    fn resolution_params(&self, id: ResolutionId) -> SensorResult<ResolutionParams> {
        self.lock()
            .model
            .modes
            .iter()
            .find(|m| m.id == id)
            .map(SensorMode::params)
            .ok_or_else(|| SensorError::InvalidValue(format!("unknown mode {}", id)))
    }

    fn afps_info(&self) -> SensorResult<AfpsInfo> {
        let state = self.lock();
        if !state.model.afps {
            return Err(SensorError::NotSupported("AFPS".to_string()));
        }

        let mut stages: Vec<AfpsStage> = state
            .model
            .modes
            .iter()
            .map(|m| AfpsStage {
                resolution: m.id,
                max_integration_time: m.max_integration_time,
            })
            .collect();
        stages.sort_by(|a, b| a.max_integration_time.total_cmp(&b.max_integration_time));

        let current = state.mode()?;
        let max_integration_time = stages
            .last()
            .map(|s| s.max_integration_time)
            .unwrap_or(current.max_integration_time);

        Ok(AfpsInfo {
            current_resolution: Some(current.id),
            min_gain: state.model.min_gain,
            max_gain: state.model.max_gain,
            min_integration_time: state.model.min_integration_time,
            max_integration_time,
            current_min_integration_time: state.model.min_integration_time,
            current_max_integration_time: current.max_integration_time,
            stages,
        })
    }

    fn apply_exposure(
        &mut self,
        gain: f32,
        integration_time: f32,
    ) -> SensorResult<AppliedExposure> {
        if !gain.is_finite() || !integration_time.is_finite() {
            return Err(SensorError::InvalidValue(format!(
                "gain {} / integration time {}",
                gain, integration_time
            )));
        }

        let mut state = self.lock();
        let max_it = state.mode()?.max_integration_time;

        let mut gain = gain.clamp(state.model.min_gain, state.model.max_gain);
        if state.model.gain_step > 0.0 {
            gain = ((gain / state.model.gain_step).round() * state.model.gain_step)
                .clamp(state.model.min_gain, state.model.max_gain);
        }
        let integration_time = integration_time.clamp(state.model.min_integration_time, max_it);

        state.gain = gain;
        state.integration_time = integration_time;
        state.applied += 1;

        Ok(AppliedExposure {
            frames_to_skip: state.model.frames_to_skip,
            gain,
            integration_time,
        })
    }

    fn gain(&self) -> SensorResult<f32> {
        Ok(self.lock().gain)
    }

    fn integration_time(&self) -> SensorResult<f32> {
        Ok(self.lock().integration_time)
    }
}

/// Static scene with per-cell brightness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticScene {
    /// Luma produced per unit of exposure (gain × seconds), row-major
    pub radiance: [f32; grid::ITEMS],
    /// Pixels each cell contributes to the histogram
    pub pixels_per_cell: u32,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            radiance: [1000.0; grid::ITEMS],
            pixels_per_cell: 100,
        }
    }
}

impl SyntheticScene {
    /// Backlit scene: bright upper rows over a dark subject
    pub fn backlit() -> Self {
        let mut radiance = [400.0; grid::ITEMS];
        for cell in radiance.iter_mut().take(2 * grid::DIM) {
            *cell = 6000.0;
        }
        Self {
            radiance,
            ..Default::default()
        }
    }

    /// Luma grid and histogram for a given applied exposure
    pub fn measure(&self, exposure: f32) -> (LumaGrid, HistogramBins) {
        let mut luma = [0u8; grid::ITEMS];
        let mut bins = [0u32; histogram::NUM_BINS];
        let bin_width = 256 / histogram::NUM_BINS;

        for (cell, &radiance) in luma.iter_mut().zip(self.radiance.iter()) {
            let value = (radiance * exposure).round().clamp(0.0, scene::LUMA_MAX) as u8;
            *cell = value;
            bins[usize::from(value) / bin_width] += self.pixels_per_cell;
        }

        (luma, bins)
    }
}

/// Everything needed for one simulation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub sensor: SensorModel,
    pub scene: SyntheticScene,
    pub config: AecConfig,
    pub frames: u32,
    /// Try to lock from this frame on
    pub lock_after: Option<u32>,
}

/// Controller state after one simulated frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame: u32,
    pub mean_luma: f32,
    pub exposure: f32,
    pub gain: f32,
    pub integration_time: f32,
    pub resolution: ResolutionId,
    pub locked: bool,
}

/// Run a scenario in closed loop
///
/// AFPS mode switches requested by the controller are applied to the
/// simulated sensor straight away.
pub fn run(
    scenario: &Scenario,
    calibration: Option<Box<dyn CalibrationDb>>,
) -> AecResult<Vec<FrameReport>> {
    let sensor = SimulatedSensor::new(scenario.sensor.clone());
    let switcher = sensor.clone();

    let mut instance = AecInstance::new(Box::new(sensor.clone())).on_resolution_change(
        move |id| {
            if let Err(err) = switcher.set_resolution(id) {
                warn!(%err, "Mode switch rejected");
            }
        },
    );
    instance.calibration = calibration;

    let mut aec = AecController::new(instance);
    aec.configure(&scenario.config)?;
    aec.start()?;

    let mut reports = Vec::with_capacity(scenario.frames as usize);
    for frame in 0..scenario.frames {
        let (luma, bins) = scenario.scene.measure(sensor.exposure());
        aec.sem_execute(&luma)?;
        aec.clm_execute(&bins)?;

        if scenario.lock_after.is_some_and(|n| frame >= n) && aec.state() == AecState::Running {
            aec.try_lock()?;
        }

        reports.push(FrameReport {
            frame,
            mean_luma: aec.context().mean_luma,
            exposure: aec.exposure(),
            gain: aec.gain()?,
            integration_time: aec.integration_time()?,
            resolution: sensor.resolution()?,
            locked: aec.state() == AecState::Locked,
        });
    }

    Ok(reports)
}
