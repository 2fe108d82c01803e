// SPDX-License-Identifier: GPL-3.0-only

//! Automatic frame-period switching
//!
//! Long integration times need a slower sensor mode. The stage table lists
//! the available modes fastest first; the fastest stage that can still hold
//! the requested integration time is selected.

use super::AecContext;
use crate::errors::AecResult;
use crate::sensor::{AfpsStage, ResolutionId, Sensor};
use tracing::{debug, info};

/// Fastest stage whose maximum integration time exceeds `integration_time`,
/// or the slowest stage when none does
pub fn select_stage(stages: &[AfpsStage], integration_time: f32) -> Option<&AfpsStage> {
    stages
        .iter()
        .find(|stage| stage.max_integration_time > integration_time)
        .or_else(|| stages.last())
}

/// Decide whether the sensor should switch mode for `integration_time`
///
/// Returns the new resolution when a switch is needed. The sensor's current
/// mode is read back first so switches made elsewhere are not repeated.
pub fn execute(
    ctx: &mut AecContext,
    sensor: &dyn Sensor,
    integration_time: f32,
) -> AecResult<Option<ResolutionId>> {
    if !ctx.afps.enabled || !ctx.afps.info.has_stages() {
        return Ok(None);
    }

    ctx.afps.current_resolution = Some(sensor.resolution()?);

    let Some(stage) = select_stage(&ctx.afps.info.stages, integration_time) else {
        return Ok(None);
    };
    debug!(
        integration_time,
        stage_max = stage.max_integration_time,
        resolution = %stage.resolution,
        "AFPS stage"
    );

    if ctx.afps.current_resolution == Some(stage.resolution) {
        return Ok(None);
    }

    let resolution = stage.resolution;
    info!(
        from = ?ctx.afps.current_resolution,
        to = %resolution,
        "AFPS resolution change"
    );
    ctx.afps.current_resolution = Some(resolution);
    Ok(Some(resolution))
}
