// SPDX-License-Identifier: GPL-3.0-only

//! Mutable state shared by all exposure control stages

use super::asem::AdaptiveScene;
use super::clm::ClmHistogram;
use super::ecm::ExposureSplit;
use super::sem::FixedScene;
use super::{AecState, GridWeights, HistogramBins, LumaGrid};
use crate::calibration::DotTable;
use crate::config::{DampingCoefficients, DampingMode, SemMode};
use crate::constants::{FlickerSelect, grid, settle};
use crate::errors::{AecError, AecResult};
use crate::sensor::profile::EcmProfile;
use crate::sensor::{AfpsInfo, ResolutionId};

/// Gain, integration time and exposure limits
///
/// Exposure is always gain × integration time, so the exposure limits are
/// derived from the other two whenever they change.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExposureBounds {
    pub min_gain: f32,
    pub max_gain: f32,
    pub min_integration_time: f32,
    pub max_integration_time: f32,
    pub min_exposure: f32,
    pub max_exposure: f32,
}

impl ExposureBounds {
    pub fn new(min_gain: f32, max_gain: f32, min_it: f32, max_it: f32) -> Self {
        let mut bounds = Self {
            min_gain,
            max_gain,
            min_integration_time: min_it,
            max_integration_time: max_it,
            ..Default::default()
        };
        bounds.update_exposure_limits();
        bounds
    }

    pub fn update_exposure_limits(&mut self) {
        self.min_exposure = self.min_gain * self.min_integration_time;
        self.max_exposure = self.max_gain * self.max_integration_time;
    }

    pub fn midpoint(&self) -> f32 {
        (self.min_exposure + self.max_exposure) / 2.0
    }

    pub fn clamp_exposure(&self, exposure: f32) -> f32 {
        exposure.max(self.min_exposure).min(self.max_exposure)
    }
}

/// Where the current limits came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitsSource {
    #[default]
    Sensor,
    DotTable,
    Afps,
}

/// Working state of the configured scene evaluation
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SceneState {
    #[default]
    Disabled,
    Fixed(FixedScene),
    Adaptive(AdaptiveScene),
}

impl SceneState {
    pub fn for_mode(mode: SemMode) -> Self {
        match mode {
            SemMode::Disabled => SceneState::Disabled,
            SemMode::Fixed => SceneState::Fixed(FixedScene::default()),
            SemMode::Adaptive => SceneState::Adaptive(AdaptiveScene::default()),
        }
    }
}

/// Last accepted exposure split, reused while the target barely moves
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EcmLock {
    pub exposure: f32,
    pub split: ExposureSplit,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AfpsState {
    pub enabled: bool,
    pub max_gain: f32,
    pub info: AfpsInfo,
    /// Last resolution requested by or read back from the sensor
    pub current_resolution: Option<ResolutionId>,
}

/// The single mutable aggregate behind an [`AecController`](super::AecController)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AecContext {
    pub state: AecState,

    // ===== Limits =====
    pub bounds: ExposureBounds,
    pub limits_source: LimitsSource,

    // ===== Control parameters =====
    pub set_point: f32,
    /// Set-point produced by scene evaluation
    pub sem_set_point: f32,
    /// Percent of the set-point
    pub clm_tolerance: f32,
    pub damping_mode: DampingMode,
    pub damping: DampingCoefficients,
    pub grid_weights: GridWeights,

    // ===== Scene evaluation =====
    pub sem_mode: SemMode,
    pub scene: SceneState,

    // ===== Measurements =====
    pub luma: LumaGrid,
    pub histogram: HistogramBins,
    pub clm_histogram: ClmHistogram,
    pub mean_luma: f32,
    pub luma_deviation: f32,

    // ===== Exposure =====
    pub start_exposure: f32,
    pub exposure: f32,
    pub gain: f32,
    pub integration_time: f32,
    pub ecm_lock: Option<EcmLock>,

    // ===== Anti-flicker =====
    pub flicker: FlickerSelect,
    pub flicker_period: f32,
    pub profile: EcmProfile,
    pub dot_table: Option<DotTable>,

    pub afps: AfpsState,
}

impl AecContext {
    pub fn new() -> Self {
        Self {
            state: AecState::Initialized,
            grid_weights: grid::DEFAULT_WEIGHTS,
            flicker_period: FlickerSelect::default().period(),
            ..Default::default()
        }
    }

    /// Set-point the control loop aims for in the current mode
    pub fn active_set_point(&self) -> f32 {
        match self.sem_mode {
            SemMode::Disabled => self.set_point,
            SemMode::Fixed | SemMode::Adaptive => self.sem_set_point,
        }
    }

    /// Close enough to the set-point, or out of exposure headroom
    pub fn settled(&self) -> bool {
        let converged = self.luma_deviation > 0.0 && self.luma_deviation < settle::MAX_DEVIATION;
        let headroom = self.bounds.max_exposure - self.exposure;
        converged || headroom <= self.flicker_period * self.bounds.max_gain
    }

    /// Forget the last split so the next conversion recomputes
    pub fn invalidate_ecm_lock(&mut self) {
        self.ecm_lock = None;
    }
}

/// Grid-weighted mean luma
pub fn weighted_mean_luma(luma: &LumaGrid, weights: &GridWeights) -> AecResult<f32> {
    let weight_sum: u32 = weights.iter().map(|&w| u32::from(w)).sum();
    if weight_sum == 0 {
        return Err(AecError::OutOfRange("grid weights sum to zero".to_string()));
    }

    let sum: u32 = luma
        .iter()
        .zip(weights.iter())
        .map(|(&l, &w)| u32::from(l) * u32::from(w))
        .sum();

    Ok(sum as f32 / weight_sum as f32)
}
