// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide constants

use serde::{Deserialize, Serialize};

/// Mains flicker frequency the integration time is aligned to
///
/// The exposure conversion quantizes integration time to multiples of the
/// resulting flicker period so that artificial light does not produce
/// visible banding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlickerSelect {
    /// No mains frequency known; use the mean of both periods
    Off,
    /// 50 Hz mains (100 Hz light flicker)
    #[default]
    Hz100,
    /// 60 Hz mains (120 Hz light flicker)
    Hz120,
}

impl FlickerSelect {
    /// Get all variants for CLI iteration
    pub const ALL: [FlickerSelect; 3] = [
        FlickerSelect::Off,
        FlickerSelect::Hz100,
        FlickerSelect::Hz120,
    ];

    /// Get display name for the selection
    pub fn display_name(&self) -> &'static str {
        match self {
            FlickerSelect::Off => "Off",
            FlickerSelect::Hz100 => "100 Hz",
            FlickerSelect::Hz120 => "120 Hz",
        }
    }

    /// Flicker period in seconds
    pub fn period(&self) -> f32 {
        match self {
            FlickerSelect::Off => flicker::PERIOD_OFF,
            FlickerSelect::Hz100 => flicker::PERIOD_100HZ,
            FlickerSelect::Hz120 => flicker::PERIOD_120HZ,
        }
    }
}

/// Measurement grid geometry
pub mod grid {
    /// Cells per grid row and column
    pub const DIM: usize = 5;

    /// Number of luma grid cells
    pub const ITEMS: usize = DIM * DIM;

    /// Center-weighted kernel used when no weights are configured
    pub const DEFAULT_WEIGHTS: [u8; ITEMS] = [
        0, 0, 1, 0, 0, //
        0, 2, 2, 2, 0, //
        0, 4, 8, 4, 0, //
        0, 2, 4, 2, 0, //
        0, 0, 0, 0, 0, //
    ];
}

/// Tone histogram sizes
pub mod histogram {
    /// Bins delivered by the measurement unit
    pub const NUM_BINS: usize = 16;

    /// Working bins available for extrapolation of a clipped histogram
    pub const CLM_NUM_BINS: usize = 3 * NUM_BINS;
}

pub mod flicker {
    pub const PERIOD_100HZ: f32 = 1.0 / 100.0;
    pub const PERIOD_120HZ: f32 = 1.0 / 120.0;
    pub const PERIOD_OFF: f32 = (PERIOD_100HZ + PERIOD_120HZ) / 2.0;
}

/// Control loop tuning
pub mod clm {
    /// Assumed black level subtracted from all means
    pub const BLACK_LEVEL: f32 = 0.0;

    /// Relative error at which the loop is considered converged
    pub const LOOP_ACCURACY: f32 = 0.001;

    /// Hard cap on loop iterations
    pub const MAX_LOOP_ITERATIONS: u32 = 100;

    /// Upper edge of the histogram bin domain
    pub const BIN_DOMAIN_MAX: f32 = 15.5;

    /// Upper bound of the black level compensation term
    pub const BLACK_LEVEL_CAP: f32 = 248.0;
}

/// Exposure conversion tuning
pub mod ecm {
    /// Exposure difference below which the last split is reused
    pub const LOCK_RANGE: f32 = 0.0001;

    /// Stand-in gain for a zero integration time
    pub const HUGE_GAIN: f32 = 65535.0;

    /// Lower bound of the flicker-avoidance integration time in seconds
    pub const MIN_T0: f32 = 0.01;

    /// Number of points in a gain/time calibration curve
    pub const DOT_COUNT: usize = 6;

    pub const DEFAULT_TIME_DOTS: [f32; DOT_COUNT] = [0.0, 0.03, 0.03, 0.03, 0.03, 0.03];
    pub const DEFAULT_GAIN_DOTS: [f32; DOT_COUNT] = [1.0, 1.0, 6.0, 6.0, 8.0, 8.0];
}

/// Scene evaluation tuning
pub mod scene {
    /// Luma difference below which no backlight is assumed
    pub const BACKLIGHT_LOW: f32 = 10.0;

    /// Luma difference above which full backlight is assumed
    pub const BACKLIGHT_HIGH: f32 = 100.0;

    /// Largest value a rescaled grid cell may take
    pub const LUMA_MAX: f32 = 255.0;
}

/// Lock settle criteria
pub mod settle {
    /// Luma deviation below which the loop counts as settled
    pub const MAX_DEVIATION: f32 = 0.36;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flicker_periods() {
        assert_eq!(FlickerSelect::Hz100.period(), 0.01);
        assert!((FlickerSelect::Hz120.period() - 0.008_333).abs() < 1e-6);
        let off = FlickerSelect::Off.period();
        assert!(off > FlickerSelect::Hz120.period() && off < FlickerSelect::Hz100.period());
    }

    #[test]
    fn test_default_kernel_is_center_weighted() {
        let center = grid::DEFAULT_WEIGHTS[2 * grid::DIM + 2];
        assert_eq!(center, *grid::DEFAULT_WEIGHTS.iter().max().unwrap());
        assert!(grid::DEFAULT_WEIGHTS.iter().map(|&w| w as u32).sum::<u32>() > 0);
    }

    #[test]
    fn test_display_names_unique() {
        let names: Vec<_> = FlickerSelect::ALL.iter().map(|f| f.display_name()).collect();
        assert_eq!(names.len(), 3);
        assert_ne!(names[0], names[1]);
        assert_ne!(names[1], names[2]);
    }
}
