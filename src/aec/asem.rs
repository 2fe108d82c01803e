// SPDX-License-Identifier: GPL-3.0-only

//! Adaptive scene evaluation
//!
//! Instead of fixed regions, the grid is segmented per frame:
//!
//! 1. Otsu threshold over the 25 cell values
//! 2. binary mask and its complement
//! 3. connected components of both masks ([`super::ccl`])
//! 4. biggest component of each mask with its center of gravity
//! 5. the component sitting lower in the frame is taken as the subject
//!
//! The backlight degree and local set-point are then computed as in fixed
//! evaluation, with the subject region in place of the geometric regions.

use super::ccl::{self, Labeling};
use super::sem::{degree_of_backlight, target_luma};
use super::{AecContext, LumaGrid, RegionMask, SceneState};
use crate::constants::grid::{DIM, ITEMS};
use tracing::trace;

/// Grid center in cell coordinates
const GRID_CENTER: f32 = DIM as f32 / 2.0;

/// Biggest connected component of a mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    pub mask: RegionMask,
    pub size: u32,
    pub center_x: f32,
    pub center_y: f32,
}

impl Component {
    fn from_label(labeling: &Labeling, label: u8) -> Self {
        let mut mask = [0u8; ITEMS];
        let mut size = 0u32;
        let mut sum_x = 0.0f32;
        let mut sum_y = 0.0f32;
        for (i, &l) in labeling.labels.iter().enumerate() {
            if l == label {
                mask[i] = 1;
                size += 1;
                sum_x += (i % DIM) as f32 + 0.5;
                sum_y += (i / DIM) as f32 + 0.5;
            }
        }
        let n = size.max(1) as f32;
        Self {
            mask,
            size,
            center_x: sum_x / n,
            center_y: sum_y / n,
        }
    }

    fn merge(&mut self, other: &Component) {
        let total = (self.size + other.size) as f32;
        self.center_x = (self.center_x * self.size as f32 + other.center_x * other.size as f32) / total;
        self.center_y = (self.center_y * self.size as f32 + other.center_y * other.size as f32) / total;
        self.size += other.size;
        for (cell, &o) in self.mask.iter_mut().zip(other.mask.iter()) {
            *cell |= o;
        }
    }

    fn distance_to_center(&self) -> f32 {
        (self.center_x - GRID_CENTER).hypot(self.center_y - GRID_CENTER)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveScene {
    pub threshold: u8,
    /// Cells at or below the threshold, and cells above it
    pub binary: [RegionMask; 2],
    pub labeling: [Labeling; 2],
    pub biggest: [Option<Component>; 2],
    /// 1 marks the subject
    pub object_region: RegionMask,
    pub object_luma: f32,
    pub background_luma: f32,
    pub difference: f32,
    pub backlight: f32,
    pub target: f32,
}

impl Default for AdaptiveScene {
    fn default() -> Self {
        Self {
            threshold: 0,
            binary: [[0; ITEMS]; 2],
            labeling: [Labeling::default(); 2],
            biggest: [None; 2],
            object_region: [1; ITEMS],
            object_luma: 0.0,
            background_luma: 0.0,
            difference: 0.0,
            backlight: 0.0,
            target: 0.0,
        }
    }
}

/// Otsu threshold of the grid values
///
/// Candidates `1..=254` are scored by the between-class separation; the
/// first maximum wins. A grid without any separation yields 0.
pub fn otsu_threshold(luma: &LumaGrid) -> u8 {
    let mut hist = [0u64; 256];
    for &l in luma {
        hist[usize::from(l)] += 1;
    }

    let total_count: u64 = hist.iter().sum();
    let total_moment: u64 = hist.iter().enumerate().map(|(i, &h)| i as u64 * h).sum();

    // Cumulative sums up to and including k
    let mut p1 = hist[0];
    let mut m1 = 0u64;
    let mut best = 0u8;
    let mut best_score = 0.0f64;

    for k in 1..255usize {
        p1 += hist[k];
        m1 += k as u64 * hist[k];
        let p2 = total_count - p1;
        let m2 = total_moment - m1;

        let p12 = match p1 * p2 {
            0 => 1,
            p => p,
        };
        let diff = (m1 * p2).abs_diff(m2 * p1) as f64;
        let score = diff / p12 as f64 * diff;
        if score > best_score {
            best_score = score;
            best = k as u8;
        }
    }

    best
}

/// 1 where the cell is brighter than the threshold
pub fn threshold_mask(luma: &LumaGrid, threshold: u8) -> RegionMask {
    let mut mask = [0u8; ITEMS];
    for (m, &l) in mask.iter_mut().zip(luma.iter()) {
        *m = u8::from(l > threshold);
    }
    mask
}

pub fn complement(mask: &RegionMask) -> RegionMask {
    let mut out = [0u8; ITEMS];
    for (o, &m) in out.iter_mut().zip(mask.iter()) {
        *o = u8::from(m == 0);
    }
    out
}

/// Pick the dominant component
///
/// A strictly larger component replaces the current pick. On equal size,
/// components with the same vertical center are merged and a lower one
/// replaces the pick.
pub fn biggest_component(labeling: &Labeling) -> Option<Component> {
    let mut best: Option<Component> = None;

    for label in 1..=labeling.count as u8 {
        let candidate = Component::from_label(labeling, label);
        match best.as_mut() {
            None => best = Some(candidate),
            Some(current) if candidate.size > current.size => *current = candidate,
            Some(current) if candidate.size == current.size => {
                if candidate.center_y == current.center_y {
                    current.merge(&candidate);
                } else if candidate.center_y > current.center_y {
                    *current = candidate;
                }
            }
            Some(_) => {}
        }
    }

    best
}

/// Choose the subject region from the two biggest components
fn select_object_region(
    biggest: &[Option<Component>; 2],
    previous: &RegionMask,
) -> RegionMask {
    let y = |c: &Option<Component>| c.as_ref().map_or(0.0, |c| c.center_y);
    let (y0, y1) = (y(&biggest[0]), y(&biggest[1]));

    match (&biggest[0], &biggest[1]) {
        (Some(low), _) if y0 > y1 => low.mask,
        (_, Some(high)) if y1 > y0 => high.mask,
        (Some(low), Some(high)) => {
            let d0 = low.distance_to_center();
            let d1 = high.distance_to_center();
            if d0 < d1 {
                low.mask
            } else if d1 < d0 {
                high.mask
            } else {
                *previous
            }
        }
        _ => *previous,
    }
}

/// Mean luma inside and outside a region
fn split_means(luma: &LumaGrid, region: &RegionMask) -> (Option<f32>, Option<f32>) {
    let (mut sum_in, mut n_in, mut sum_out, mut n_out) = (0u32, 0u32, 0u32, 0u32);
    for (&l, &r) in luma.iter().zip(region.iter()) {
        if r != 0 {
            sum_in += u32::from(l);
            n_in += 1;
        } else {
            sum_out += u32::from(l);
            n_out += 1;
        }
    }
    let mean = |sum: u32, n: u32| (n > 0).then(|| sum as f32 / n as f32);
    (mean(sum_in, n_in), mean(sum_out, n_out))
}

/// Evaluate one frame
///
/// `previous_region` is kept when the two candidate regions cannot be told
/// apart.
pub fn evaluate(luma: &LumaGrid, set_point: f32, previous_region: &RegionMask) -> AdaptiveScene {
    let threshold = otsu_threshold(luma);
    let above = threshold_mask(luma, threshold);
    let below = complement(&above);
    let binary = [below, above];

    let labeling = [ccl::label_components(&below), ccl::label_components(&above)];
    let biggest = [
        biggest_component(&labeling[0]),
        biggest_component(&labeling[1]),
    ];

    let object_region = select_object_region(&biggest, previous_region);
    let (inside, outside) = split_means(luma, &object_region);
    let object_luma = inside.unwrap_or(0.0);
    let background_luma = outside.unwrap_or(0.0);

    // Without a background there is nothing to compare against
    let difference = match (inside, outside) {
        (Some(i), Some(o)) => (o - i).abs(),
        _ => 0.0,
    };
    let backlight = degree_of_backlight(difference);
    let target = target_luma(luma, set_point, object_luma, backlight);

    AdaptiveScene {
        threshold,
        binary,
        labeling,
        biggest,
        object_region,
        object_luma,
        background_luma,
        difference,
        backlight,
        target,
    }
}

/// Run adaptive scene evaluation and publish the local set-point
pub fn execute(ctx: &mut AecContext, luma: &LumaGrid) {
    let previous = match &ctx.scene {
        SceneState::Adaptive(scene) => scene.object_region,
        _ => [1; ITEMS],
    };
    let result = evaluate(luma, ctx.set_point, &previous);
    trace!(
        threshold = result.threshold,
        d = result.difference,
        z = result.backlight,
        m0 = result.target,
        "Adaptive scene evaluation"
    );
    ctx.sem_set_point = result.target;
    ctx.scene = SceneState::Adaptive(result);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bright sky over a dark foreground occupying the lower three rows
    fn backlit_grid() -> LumaGrid {
        let mut luma = [30u8; ITEMS];
        for cell in luma.iter_mut().take(2 * DIM) {
            *cell = 230;
        }
        luma
    }

    #[test]
    fn test_otsu_separates_two_levels() {
        let threshold = otsu_threshold(&backlit_grid());
        assert!((30..230).contains(&threshold));
    }

    #[test]
    fn test_otsu_is_deterministic() {
        let mut luma = [0u8; ITEMS];
        for (i, cell) in luma.iter_mut().enumerate() {
            *cell = (i as u8).wrapping_mul(37);
        }
        let first = otsu_threshold(&luma);
        for _ in 0..3 {
            assert_eq!(otsu_threshold(&luma), first);
        }
    }

    #[test]
    fn test_otsu_uniform_grid() {
        assert_eq!(otsu_threshold(&[90; ITEMS]), 0);
    }

    #[test]
    fn test_complement() {
        let mask = threshold_mask(&backlit_grid(), 100);
        let inv = complement(&mask);
        for (a, b) in mask.iter().zip(inv.iter()) {
            assert_eq!(a + b, 1);
        }
    }

    #[test]
    fn test_biggest_component_prefers_size() {
        let mut mask = [0u8; ITEMS];
        // Two cells top-left, four cells bottom-right
        mask[0] = 1;
        mask[1] = 1;
        for i in [18, 19, 23, 24] {
            mask[i] = 1;
        }
        let labeling = ccl::label_components(&mask);
        let big = biggest_component(&labeling).unwrap();
        assert_eq!(big.size, 4);
        assert_eq!(big.center_x, 4.0);
        assert_eq!(big.center_y, 4.0);
    }

    #[test]
    fn test_equal_components_on_same_row_merge() {
        let mut mask = [0u8; ITEMS];
        mask[20] = 1;
        mask[24] = 1;
        let labeling = ccl::label_components(&mask);
        assert_eq!(labeling.count, 2);
        let big = biggest_component(&labeling).unwrap();
        assert_eq!(big.size, 2);
        assert_eq!(big.center_x, 2.5);
        assert_eq!(big.center_y, 4.5);
        assert_eq!(big.mask[20] + big.mask[24], 2);
    }

    #[test]
    fn test_equal_components_lower_one_wins() {
        let mut mask = [0u8; ITEMS];
        mask[0] = 1;
        mask[22] = 1;
        let big = biggest_component(&ccl::label_components(&mask)).unwrap();
        assert_eq!(big.mask[22], 1);
        assert_eq!(big.mask[0], 0);
    }

    #[test]
    fn test_foreground_becomes_object_region() {
        let scene = evaluate(&backlit_grid(), 100.0, &[1; ITEMS]);
        for (i, &r) in scene.object_region.iter().enumerate() {
            assert_eq!(r, u8::from(i >= 2 * DIM), "cell {}", i);
        }
        assert_eq!(scene.object_luma, 30.0);
        assert_eq!(scene.background_luma, 230.0);
        assert_eq!(scene.difference, 200.0);
        assert_eq!(scene.backlight, 1.0);
        assert!(scene.target > 100.0);
    }

    #[test]
    fn test_uniform_grid_keeps_set_point() {
        let scene = evaluate(&[90; ITEMS], 120.0, &[1; ITEMS]);
        assert_eq!(scene.object_region, [1; ITEMS]);
        assert_eq!(scene.backlight, 0.0);
        assert_eq!(scene.target, 120.0);
    }

    #[test]
    fn test_object_region_is_partition() {
        let mut luma = [0u8; ITEMS];
        for (i, cell) in luma.iter_mut().enumerate() {
            *cell = ((i * 53) % 256) as u8;
        }
        let scene = evaluate(&luma, 128.0, &[1; ITEMS]);
        assert!(scene.object_region.iter().all(|&c| c <= 1));
        assert!(scene.object_region.iter().any(|&c| c == 1));
    }
}
