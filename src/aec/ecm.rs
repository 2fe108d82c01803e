// SPDX-License-Identifier: GPL-3.0-only

//! Exposure conversion
//!
//! Splits a target exposure (gain × integration time) into the two sensor
//! controls. Integration time is kept at multiples of the flicker period
//! wherever the gain limits allow it.

use super::AecContext;
use super::context::{EcmLock, ExposureBounds};
use crate::calibration::DotTable;
use crate::constants::ecm;
use crate::errors::{AecError, AecResult};
use crate::sensor::profile::EcmProfile;
use tracing::trace;

/// Gain and integration time for one exposure
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExposureSplit {
    pub gain: f32,
    /// Seconds
    pub integration_time: f32,
}

impl ExposureSplit {
    pub fn exposure(&self) -> f32 {
        self.gain * self.integration_time
    }
}

fn snap_floor(t: f32, period: f32) -> f32 {
    (t / period).floor() * period
}

fn snap_round(t: f32, period: f32) -> f32 {
    (t / period).round() * period
}

fn snap_ceil(t: f32, period: f32) -> f32 {
    (t / period).ceil() * period
}

/// Continuous gain/time curve with flicker avoidance
///
/// Below `T0` (bright scenes) the minimum gain is used and time is free.
/// Above it, gain and time grow together along `g = g0^(A0/(A0+1))` and the
/// time is snapped to the flicker grid.
pub fn split_continuous(
    exposure: f32,
    bounds: &ExposureBounds,
    profile: &EcmProfile,
    flicker_period: f32,
) -> ExposureSplit {
    let t0 = profile
        .t0
        .min(bounds.max_integration_time)
        .max(ecm::MIN_T0);
    let g0 = exposure / t0;

    if g0 < bounds.min_gain {
        let gain = bounds.min_gain;
        return ExposureSplit {
            gain,
            integration_time: exposure / gain,
        };
    }

    let mut t_max = snap_floor(bounds.max_integration_time, flicker_period);
    if t_max <= 0.0 {
        t_max = bounds.max_integration_time;
    }

    let a0 = profile.a0;
    let gc = g0.powf(a0 / (a0 + 1.0));
    let tc = exposure / gc;

    let mut t = t_max.min(snap_round(tc, flicker_period));
    let g_tmp = if t == 0.0 { ecm::HUGE_GAIN } else { exposure / t };

    if g_tmp < bounds.min_gain {
        t = t_max.min(snap_floor(tc, flicker_period));
    } else if g_tmp > bounds.max_gain {
        t = t_max.min(snap_ceil(exposure / bounds.max_gain, flicker_period));
    }

    if !(t > 0.0) {
        let gain = bounds.min_gain;
        return ExposureSplit {
            gain,
            integration_time: exposure / gain,
        };
    }

    let gain = (exposure / t).min(bounds.max_gain).max(bounds.min_gain);
    trace!(t0, tc, gc, t, gain, "Continuous split");

    ExposureSplit {
        gain,
        integration_time: t,
    }
}

/// Piecewise split along a six-point calibration curve
pub fn split_dot_table(
    exposure: f32,
    bounds: &ExposureBounds,
    table: &DotTable,
    flicker_period: f32,
) -> ExposureSplit {
    let last = ecm::DOT_COUNT - 1;
    let mut time = table.time;
    let mut gain = table.gain;
    time[last] = bounds.max_integration_time;
    gain[last] = bounds.max_gain;

    for (t, g) in time.iter_mut().zip(gain.iter_mut()) {
        *g = g.min(bounds.max_gain);
        *t = snap_floor(t.min(bounds.max_integration_time), flicker_period);
    }

    let dot = (0..ecm::DOT_COUNT)
        .find(|&d| time[d] * gain[d] > exposure)
        .unwrap_or(ecm::DOT_COUNT);

    let (mut g, mut t) = (0.0f32, 0.0f32);
    if dot > 0 && dot < ecm::DOT_COUNT {
        if time[dot - 1] == time[dot] {
            // Time is constant on this segment
            t = time[dot];
            g = exposure / t;
        } else if gain[dot - 1] == gain[dot] {
            // Gain is constant on this segment
            g = gain[dot];
            t = exposure / g;
            if t > flicker_period {
                let mut snapped = snap_round(t, flicker_period);
                g = exposure / snapped;
                if g > gain[dot] {
                    snapped = snap_ceil(t, flicker_period);
                    g = exposure / snapped;
                }
                if g < bounds.min_gain {
                    snapped = snap_floor(t, flicker_period);
                    g = exposure / snapped;
                }
                t = snapped;
            }
        } else {
            t = time[dot];
            g = exposure / t;
        }
    } else if dot == ecm::DOT_COUNT {
        g = gain[last];
        t = time[last];
    }

    if g < bounds.min_gain {
        g = bounds.min_gain;
        t = exposure / g;
    } else if g > bounds.max_gain {
        g = bounds.max_gain;
        t = exposure / g;
    }
    trace!(dot, gain = g, integration_time = t, "Dot table split");

    ExposureSplit {
        gain: g,
        integration_time: t,
    }
}

fn check_exposure(exposure: f32) -> AecResult<()> {
    if exposure >= 0.0 {
        Ok(())
    } else {
        Err(AecError::OutOfRange(format!(
            "target exposure {} is negative",
            exposure
        )))
    }
}

/// Split without the oscillation lock and remember the result
pub fn execute_direct(ctx: &mut AecContext, exposure: f32) -> AecResult<ExposureSplit> {
    check_exposure(exposure)?;

    let split = match &ctx.dot_table {
        Some(table) => split_dot_table(exposure, &ctx.bounds, table, ctx.flicker_period),
        None => split_continuous(exposure, &ctx.bounds, &ctx.profile, ctx.flicker_period),
    };

    ctx.ecm_lock = Some(EcmLock { exposure, split });
    Ok(split)
}

/// Split, reusing the last result while the target stays within the lock range
pub fn execute(ctx: &mut AecContext, exposure: f32) -> AecResult<ExposureSplit> {
    check_exposure(exposure)?;

    if let Some(lock) = ctx.ecm_lock {
        if (lock.exposure - exposure).abs() < ecm::LOCK_RANGE {
            return Ok(lock.split);
        }
    }
    execute_direct(ctx, exposure)
}
