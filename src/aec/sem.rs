// SPDX-License-Identifier: GPL-3.0-only

//! Fixed scene evaluation
//!
//! Splits the grid into five fixed regions and estimates how strongly the
//! scene is backlit from the difference between the upper/side regions and
//! the lower/center regions (where the subject usually is). The stronger the
//! backlight, the more the set-point is shifted so that the subject instead
//! of the whole frame reaches the target brightness.

use super::{AecContext, LumaGrid, SceneState};
use crate::constants::{grid, scene};
use tracing::trace;

/// Cell indices of the five evaluation regions
const REGIONS: [&[usize]; 5] = [
    // top row
    &[0, 1, 2, 3, 4],
    // bottom row
    &[20, 21, 22, 23, 24],
    // left side
    &[5, 6, 10, 15],
    // right side
    &[8, 9, 14, 19],
    // center
    &[7, 11, 12, 13, 16, 17, 18],
];

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FixedScene {
    pub region_means: [f32; 5],
    pub object_luma: f32,
    /// Backlight magnitude `d`
    pub difference: f32,
    /// Degree of backlight `z` in `[0, 1]`
    pub backlight: f32,
    /// Local set-point `m0`
    pub target: f32,
}

fn region_mean(luma: &LumaGrid, cells: &[usize]) -> f32 {
    let sum: u32 = cells.iter().map(|&i| u32::from(luma[i])).sum();
    sum as f32 / cells.len() as f32
}

/// Clamped linear ramp from no backlight to full backlight
pub fn degree_of_backlight(difference: f32) -> f32 {
    if difference < scene::BACKLIGHT_LOW {
        0.0
    } else if difference > scene::BACKLIGHT_HIGH {
        1.0
    } else {
        (difference - scene::BACKLIGHT_LOW) / (scene::BACKLIGHT_HIGH - scene::BACKLIGHT_LOW)
    }
}

/// Blend the global set-point with the one that would expose the subject
pub fn target_luma(luma: &LumaGrid, set_point: f32, object_luma: f32, backlight: f32) -> f32 {
    // A black subject would make every cell saturate
    let object_luma = if object_luma > 0.0 { object_luma } else { 1.0 };

    let mean = luma
        .iter()
        .map(|&l| (f32::from(l) * set_point / object_luma).min(scene::LUMA_MAX))
        .sum::<f32>()
        / grid::ITEMS as f32;

    (1.0 - backlight) * set_point + backlight * mean
}

/// Evaluate one frame
pub fn evaluate(luma: &LumaGrid, set_point: f32) -> FixedScene {
    let mut region_means = [0.0; 5];
    for (mean, cells) in region_means.iter_mut().zip(REGIONS) {
        *mean = region_mean(luma, cells);
    }
    let [top, bottom, left, right, center] = region_means;

    let object_luma = (5.0 * bottom + 7.0 * center) / 12.0;
    let difference = ((top + left.max(right)) - (bottom + center)).abs();
    let backlight = degree_of_backlight(difference);
    let target = target_luma(luma, set_point, object_luma, backlight);

    FixedScene {
        region_means,
        object_luma,
        difference,
        backlight,
        target,
    }
}

/// Run fixed scene evaluation and publish the local set-point
pub fn execute(ctx: &mut AecContext, luma: &LumaGrid) {
    let result = evaluate(luma, ctx.set_point);
    trace!(
        d = result.difference,
        z = result.backlight,
        m0 = result.target,
        "Fixed scene evaluation"
    );
    ctx.sem_set_point = result.target;
    ctx.scene = SceneState::Fixed(result);
}
