// SPDX-License-Identifier: GPL-3.0-only

//! Calibration database access
//!
//! A calibration database supplies tuned AEC coefficients for a specific
//! sensor module. When present they take precedence over the values in
//! [`AecConfig`](crate::config::AecConfig).

use crate::config::DampingCoefficients;
use crate::constants::{ecm, grid};
use crate::errors::CalibrationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Global AEC calibration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AecCalibration {
    pub set_point: f32,
    pub clm_tolerance: f32,
    pub damping: DampingCoefficients,
    pub afps_max_gain: f32,
    /// All zero selects the built-in center-weighted kernel
    pub grid_weights: [u8; grid::ITEMS],
    /// Use the gain/time curve below instead of the continuous split
    pub ecm_dot_enable: bool,
    pub ecm_time_dots: [f32; ecm::DOT_COUNT],
    pub ecm_gain_dots: [f32; ecm::DOT_COUNT],
}

impl Default for AecCalibration {
    fn default() -> Self {
        Self {
            set_point: 128.0,
            clm_tolerance: 5.0,
            damping: DampingCoefficients::default(),
            afps_max_gain: 8.0,
            grid_weights: [0; grid::ITEMS],
            ecm_dot_enable: false,
            ecm_time_dots: ecm::DEFAULT_TIME_DOTS,
            ecm_gain_dots: ecm::DEFAULT_GAIN_DOTS,
        }
    }
}

impl AecCalibration {
    /// Calibrated grid weights, unless left at all zero
    pub fn custom_grid_weights(&self) -> Option<[u8; grid::ITEMS]> {
        self.grid_weights
            .iter()
            .any(|&w| w != 0)
            .then_some(self.grid_weights)
    }

    /// Gain/time curve, if enabled
    pub fn dot_table(&self) -> Option<DotTable> {
        self.ecm_dot_enable
            .then(|| DotTable::with_defaults(&self.ecm_time_dots, &self.ecm_gain_dots))
    }
}

/// Six-point gain/time calibration curve
///
/// Point 0 is the minimum and point 5 the maximum of the exposure range.
/// The split walks the curve in order, holding time or gain constant per
/// segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DotTable {
    pub time: [f32; ecm::DOT_COUNT],
    pub gain: [f32; ecm::DOT_COUNT],
}

impl DotTable {
    /// Build a table, replacing non-positive entries with the built-in curve
    pub fn with_defaults(time: &[f32; ecm::DOT_COUNT], gain: &[f32; ecm::DOT_COUNT]) -> Self {
        let mut table = Self {
            time: ecm::DEFAULT_TIME_DOTS,
            gain: ecm::DEFAULT_GAIN_DOTS,
        };
        for i in 0..ecm::DOT_COUNT {
            if time[i] > 0.0 {
                table.time[i] = time[i];
            }
            if gain[i] > 0.0 {
                table.gain[i] = gain[i];
            }
        }
        table
    }

    pub fn min_integration_time(&self) -> f32 {
        self.time[0]
    }

    pub fn max_integration_time(&self) -> f32 {
        self.time[ecm::DOT_COUNT - 1]
    }

    pub fn min_gain(&self) -> f32 {
        self.gain[0]
    }

    pub fn max_gain(&self) -> f32 {
        self.gain[ecm::DOT_COUNT - 1]
    }
}

/// Source of calibration data
pub trait CalibrationDb: Send {
    /// Fetch the global AEC section
    fn aec_global(&self) -> Result<AecCalibration, CalibrationError>;
}

impl CalibrationDb for AecCalibration {
    fn aec_global(&self) -> Result<AecCalibration, CalibrationError> {
        Ok(self.clone())
    }
}

/// JSON calibration file, re-read on every query
#[derive(Debug, Clone)]
pub struct CalibrationFile {
    path: PathBuf,
}

impl CalibrationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/camera-aec/calibration.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("camera-aec").join("calibration.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationDb for CalibrationFile {
    fn aec_global(&self) -> Result<AecCalibration, CalibrationError> {
        let data = std::fs::read_to_string(&self.path)?;
        let calibration: AecCalibration = serde_json::from_str(&data)?;
        debug!(path = %self.path.display(), "Loaded AEC calibration");
        Ok(calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_weights_are_not_custom() {
        let calib = AecCalibration::default();
        assert_eq!(calib.custom_grid_weights(), None);

        let mut custom = AecCalibration::default();
        custom.grid_weights = [1; grid::ITEMS];
        assert_eq!(custom.custom_grid_weights(), Some([1; grid::ITEMS]));
    }

    #[test]
    fn test_dot_table_defaults_fill_gaps() {
        let table = DotTable::with_defaults(
            &[0.0, 0.02, -1.0, 0.04, 0.0, 0.066],
            &[1.0, 0.0, 4.0, 4.0, 0.0, 10.0],
        );
        assert_eq!(table.time, [0.0, 0.02, 0.03, 0.04, 0.03, 0.066]);
        assert_eq!(table.gain, [1.0, 1.0, 4.0, 4.0, 8.0, 10.0]);
        assert_eq!(table.max_integration_time(), 0.066);
        assert_eq!(table.max_gain(), 10.0);
    }

    #[test]
    fn test_dot_table_disabled() {
        assert!(AecCalibration::default().dot_table().is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let file = CalibrationFile::new("/nonexistent/camera-aec/calibration.json");
        assert!(matches!(file.aec_global(), Err(CalibrationError::Io(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("aec-calib-{}.json", std::process::id()));
        let mut calib = AecCalibration::default();
        calib.set_point = 90.0;
        std::fs::write(&path, serde_json::to_string_pretty(&calib).unwrap()).unwrap();

        let loaded = CalibrationFile::new(&path).aec_global().unwrap();
        assert_eq!(loaded.set_point, 90.0);
        let _ = std::fs::remove_file(&path);
    }
}
