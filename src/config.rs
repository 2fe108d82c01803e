// SPDX-License-Identifier: GPL-3.0-only

//! Exposure control configuration
//!
//! [`AecConfig`] is what the surrounding pipeline hands to
//! `AecController::configure`. Values that a calibration database also
//! provides (set-point, tolerance, damping, AFPS gain, grid weights) are
//! overridden by calibration on a full configure.

use crate::constants::{FlickerSelect, grid};
use crate::errors::{AecError, AecResult};
use serde::{Deserialize, Serialize};

/// Scene evaluation strategy used to derive the per-frame set-point
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum SemMode {
    /// Use the configured set-point unchanged
    Disabled,
    /// Fixed geometric regions (backlight heuristic)
    #[default]
    Fixed,
    /// Otsu segmentation with connected-component subject detection
    Adaptive,
}

impl SemMode {
    pub const ALL: [SemMode; 3] = [SemMode::Disabled, SemMode::Fixed, SemMode::Adaptive];

    pub fn display_name(&self) -> &'static str {
        match self {
            SemMode::Disabled => "Disabled",
            SemMode::Fixed => "Fixed",
            SemMode::Adaptive => "Adaptive",
        }
    }
}

/// Which pair of damping coefficients is active
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum DampingMode {
    /// Still capture: settle quickly
    Still,
    /// Video: avoid visible brightness jumps
    #[default]
    Video,
}

impl DampingMode {
    pub const ALL: [DampingMode; 2] = [DampingMode::Still, DampingMode::Video];

    pub fn display_name(&self) -> &'static str {
        match self {
            DampingMode::Still => "Still",
            DampingMode::Video => "Video",
        }
    }
}

/// Blend factors toward the current exposure, all in `[0, 1]`
///
/// "Over" applies while the scene is brighter than the set-point,
/// "under" while it is darker.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DampingCoefficients {
    pub over_still: f32,
    pub under_still: f32,
    pub over_video: f32,
    pub under_video: f32,
}

impl Default for DampingCoefficients {
    fn default() -> Self {
        Self {
            over_still: 0.3,
            under_still: 0.3,
            over_video: 0.6,
            under_video: 0.7,
        }
    }
}

impl DampingCoefficients {
    /// Coefficient for the given mode and brightness direction
    pub fn select(&self, mode: DampingMode, overexposed: bool) -> f32 {
        match (mode, overexposed) {
            (DampingMode::Still, true) => self.over_still,
            (DampingMode::Still, false) => self.under_still,
            (DampingMode::Video, true) => self.over_video,
            (DampingMode::Video, false) => self.under_video,
        }
    }

    fn validate(&self) -> AecResult<()> {
        for (name, value) in [
            ("over_still", self.over_still),
            ("under_still", self.under_still),
            ("over_video", self.over_video),
            ("under_video", self.under_video),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AecError::InvalidArgument(format!(
                    "damping coefficient {} = {} outside [0, 1]",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AecConfig {
    /// Scene evaluation strategy
    pub sem_mode: SemMode,
    /// Target mean luma (0..255)
    pub set_point: f32,
    /// Control loop dead band in percent of the set-point
    pub clm_tolerance: f32,
    /// Active damping pair
    pub damping_mode: DampingMode,
    pub damping: DampingCoefficients,
    /// Mains flicker selection
    pub flicker: FlickerSelect,
    /// Allow the controller to request slower sensor modes
    pub afps_enabled: bool,
    /// Gain ceiling while AFPS is in charge of the limits
    pub afps_max_gain: f32,
    /// Per-cell weights for the mean luma; `None` uses the built-in kernel
    pub grid_weights: Option<[u8; grid::ITEMS]>,
}

impl Default for AecConfig {
    fn default() -> Self {
        Self {
            sem_mode: SemMode::default(),
            set_point: 128.0,
            clm_tolerance: 5.0,
            damping_mode: DampingMode::default(),
            damping: DampingCoefficients::default(),
            flicker: FlickerSelect::default(),
            afps_enabled: false,
            afps_max_gain: 8.0,
            grid_weights: None,
        }
    }
}

impl AecConfig {
    /// Reject values the controller cannot work with
    pub fn validate(&self) -> AecResult<()> {
        if !(self.set_point > 0.0) {
            return Err(AecError::InvalidArgument(format!(
                "set-point must be positive, got {}",
                self.set_point
            )));
        }
        if !(self.clm_tolerance >= 0.0) {
            return Err(AecError::InvalidArgument(format!(
                "tolerance must not be negative, got {}",
                self.clm_tolerance
            )));
        }
        if self.afps_enabled && !(self.afps_max_gain > 0.0) {
            return Err(AecError::InvalidArgument(format!(
                "AFPS max gain must be positive, got {}",
                self.afps_max_gain
            )));
        }
        self.damping.validate()
    }
}
