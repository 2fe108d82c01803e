// SPDX-License-Identifier: GPL-3.0-only

//! Per-mode flicker-avoidance profile
//!
//! The continuous exposure split needs two mode-dependent numbers: the
//! integration time `T0` at which flicker avoidance starts (expressed as a
//! multiple of the flicker period) and the slope `A0` of the gain/time
//! power-law blend. Known sensor modes carry either a fixed pair or a rule
//! that scales with the mode's frame rate.

use super::ResolutionParams;
use crate::errors::{AecError, AecResult};
use tracing::debug;

/// How `T0`/`A0` are derived for a mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum T0Rule {
    /// Fixed multiple of the flicker period and fixed slope
    Fixed { factor: f32, a0: f32 },
    /// `floor(max_it / Tf) * fps / 60` periods, slope 1
    FrameRateScaled,
}

/// Resolved profile for the current mode
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EcmProfile {
    pub t0_factor: f32,
    /// Start of flicker avoidance in seconds
    pub t0: f32,
    pub a0: f32,
}

const fn fixed(factor: f32, a0: f32) -> Option<T0Rule> {
    Some(T0Rule::Fixed { factor, a0 })
}

/// Look up the rule for a sensor mode
pub fn t0_rule(params: ResolutionParams) -> Option<T0Rule> {
    use T0Rule::FrameRateScaled as Scaled;

    let ResolutionParams { width, height, fps } = params;
    match (width, height, fps) {
        (4416, 3312, 7 | 15 | 30) => fixed(3.0, 0.8),

        (1920, 1080, 5) => fixed(2.0, 0.9),
        (1920, 1080, 10) => fixed(1.0, 1.0),
        (1920, 1080, 6) => fixed(1.0, 0.6),
        (1920, 1080, 12) => fixed(1.0, 0.8),
        (1920, 1080, 15) => fixed(1.0, 0.6),
        (1920, 1080, 20) => fixed(1.0, 0.8),
        (1920, 1080, 24 | 30) => fixed(1.0, 1.0),

        (640, 480, 5 | 10 | 15 | 20 | 30 | 60 | 120)
        | (800, 600, 5 | 10 | 15 | 20 | 30 | 60 | 120)
        | (3120, 3120, 30)
        | (1280, 960, 10 | 15 | 20 | 25 | 30)
        | (1296, 972, 7 | 10 | 15 | 20 | 25 | 30)
        | (2208, 1656, 7 | 15 | 30) => fixed(1.0, 1.0),

        (2592, 1944, 5 | 7 | 10 | 15 | 20 | 25 | 30)
        | (3264, 2448, 7 | 10 | 15 | 20 | 25 | 30)
        | (1632, 1224, 7 | 10 | 15 | 20 | 25 | 30)
        | (1600, 1200, 7 | 10 | 15 | 20 | 30)
        | (4224, 3136, 4 | 7 | 10 | 15 | 20 | 25 | 30)
        | (2688, 1520, 7 | 10 | 15 | 20 | 25 | 30)
        | (672, 376, 10 | 15 | 20 | 25 | 30 | 60)
        | (2112, 1568, 7 | 10 | 15 | 20 | 25 | 30 | 40 | 50 | 60)
        | (4224, 3120, 15)
        | (3120, 3120, 15 | 25)
        | (2112, 1560, 30)
        | (4208, 3120, 4 | 7 | 10 | 15 | 20 | 25 | 30)
        | (2104, 1560, 7 | 10 | 15 | 20 | 25 | 30 | 40 | 50 | 60)
        | (1640, 1232, 10 | 15 | 20 | 25 | 30)
        | (3280, 2464, 7 | 15 | 20 | 25 | 30) => Some(Scaled),

        _ => None,
    }
}

/// Resolve `T0`/`A0` for a mode
///
/// `sensor_max_it` is the sensor's own maximum integration time for the
/// mode; `max_it` is the controller's active limit that caps `T0`.
pub fn ecm_profile(
    params: ResolutionParams,
    sensor_max_it: f32,
    max_it: f32,
    flicker_period: f32,
) -> AecResult<EcmProfile> {
    let rule = t0_rule(params).ok_or_else(|| {
        AecError::OutOfRange(format!("no exposure profile for sensor mode {}", params))
    })?;

    let (t0_factor, a0) = match rule {
        T0Rule::Fixed { factor, a0 } => (factor, a0),
        T0Rule::FrameRateScaled => {
            let periods = (sensor_max_it / flicker_period).floor();
            (periods * f32::from(params.fps) / 60.0, 1.0)
        }
    };

    let t0 = (t0_factor * flicker_period).min(max_it);
    debug!(mode = %params, t0_factor, t0, a0, "Resolved exposure profile");

    Ok(EcmProfile { t0_factor, t0, a0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: u16, height: u16, fps: u16) -> ResolutionParams {
        ResolutionParams { width, height, fps }
    }

    #[test]
    fn test_fixed_profiles() {
        assert_eq!(
            t0_rule(mode(4416, 3312, 15)),
            Some(T0Rule::Fixed { factor: 3.0, a0: 0.8 })
        );
        assert_eq!(
            t0_rule(mode(1920, 1080, 5)),
            Some(T0Rule::Fixed { factor: 2.0, a0: 0.9 })
        );
        assert_eq!(
            t0_rule(mode(640, 480, 30)),
            Some(T0Rule::Fixed { factor: 1.0, a0: 1.0 })
        );
    }

    #[test]
    fn test_frame_rate_scaled_profile() {
        // 0.1 s max integration at 100 Hz is 10 periods; 30 fps halves it
        let profile = ecm_profile(mode(2592, 1944, 30), 0.1, 0.1, 0.01).unwrap();
        assert_eq!(profile.t0_factor, 5.0);
        assert_eq!(profile.a0, 1.0);
        assert!((profile.t0 - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_t0_capped_by_max_integration_time() {
        let profile = ecm_profile(mode(4416, 3312, 30), 0.1, 0.02, 0.01).unwrap();
        assert_eq!(profile.t0, 0.02);
    }

    #[test]
    fn test_unknown_mode_is_out_of_range() {
        let err = ecm_profile(mode(1234, 567, 30), 0.03, 0.03, 0.01).unwrap_err();
        assert!(matches!(err, AecError::OutOfRange(_)));
        assert!(t0_rule(mode(1920, 1080, 60)).is_none());
    }
}
