// SPDX-License-Identifier: GPL-3.0-only

//! Control loop
//!
//! Predicts the exposure that brings the histogram mean to the set-point.
//! The histogram is stretched by the candidate exposure ratio (bins pile up
//! at the top edge as they would in a real sensor) and the exposure is
//! corrected until the predicted mean matches.
//!
//! Histogram means are in the 16-bin domain scaled by 16, so they are
//! directly comparable with 8-bit luma values.

use super::context::ExposureBounds;
use super::{AecContext, HistogramBins};
use crate::constants::{clm, histogram};
use crate::errors::{AecError, AecResult};
use tracing::{debug, trace};

/// Working histogram, extended with a synthetic tail when clipped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClmHistogram {
    pub bins: [u32; histogram::CLM_NUM_BINS],
    /// Number of valid bins, `NUM_BINS..=CLM_NUM_BINS`
    pub size: usize,
}

impl Default for ClmHistogram {
    fn default() -> Self {
        Self {
            bins: [0; histogram::CLM_NUM_BINS],
            size: histogram::NUM_BINS,
        }
    }
}

impl ClmHistogram {
    /// Copy the measured bins and extrapolate a clipped top bin
    ///
    /// When the last bin holds more than its neighbour the sensor is
    /// saturating. The excess is spread over a linearly decaying tail of
    /// virtual bins whose area matches the clipped bin.
    pub fn extrapolate(bins: &HistogramBins) -> Self {
        const LAST: usize = histogram::NUM_BINS - 1;

        let mut out = Self::default();
        out.bins[..LAST].copy_from_slice(&bins[..LAST]);

        let top = u64::from(bins[LAST]);
        let below = u64::from(bins[LAST - 1]);

        if top > below && below > 0 {
            let max_width = (histogram::CLM_NUM_BINS - (LAST - 1)) as u64;
            let width = (2 * top / below + 1).min(max_width);
            let height = 2 * top / width;
            // The last tail bin would be zero
            let n = width - 1;
            for i in 0..n {
                out.bins[LAST + i as usize] = (height - height * i / n) as u32;
            }
            out.size = LAST + n as usize;
        } else {
            out.bins[LAST] = bins[LAST];
            out.size = histogram::NUM_BINS;
        }

        out
    }

    pub fn active(&self) -> &[u32] {
        &self.bins[..self.size]
    }

    /// Bin total, never zero
    pub fn sum(&self) -> u64 {
        match self.active().iter().map(|&b| u64::from(b)).sum() {
            0 => 1,
            s => s,
        }
    }

    /// Mean bin position scaled to luma units, never zero
    pub fn mean(&self) -> f32 {
        let sum = self.sum() as f32;
        let mean: f32 = self
            .active()
            .iter()
            .enumerate()
            .map(|(i, &b)| (16.0 * b as f32 / sum) * (i as f32 + 0.5).min(clm::BIN_DOMAIN_MAX))
            .sum();
        if mean > 0.0 { mean } else { 1.0 }
    }
}

/// Relative distance of the mean luma from the set-point
pub fn luma_deviation(set_point: f32, mean_luma: f32) -> f32 {
    (set_point - mean_luma).abs() / set_point
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClmOutcome {
    pub new_exposure: f32,
    pub iterations: u32,
    /// Relative error of the last prediction
    pub loop_value: f32,
}

/// Iterate the exposure prediction
///
/// Stops on convergence, on hitting either exposure limit, or after
/// [`clm::MAX_LOOP_ITERATIONS`].
pub fn converge(
    hist: &ClmHistogram,
    set_point: f32,
    mean_luma: f32,
    exposure: f32,
    bounds: &ExposureBounds,
) -> AecResult<ClmOutcome> {
    if !(exposure > 0.0) {
        return Err(AecError::OutOfRange(format!(
            "current exposure {} is not positive",
            exposure
        )));
    }

    let bl = clm::BLACK_LEVEL;
    let sum = hist.sum() as f32;

    let sp = (set_point - bl).max(f32::EPSILON);
    let ml = (mean_luma - bl).max(f32::EPSILON);
    let mut mh = (hist.mean() - bl).max(f32::EPSILON);

    let mean_ratio = ml / mh;
    let mut loop_value = (sp - mh).abs() / sp;
    let mut new_exposure = exposure;
    let mut iterations = 0u32;

    while loop_value > clm::LOOP_ACCURACY {
        let ratio = new_exposure * mean_ratio / exposure;

        let mut mean = 0.0f32;
        for (i, &b) in hist.active().iter().enumerate() {
            let x = (ratio * (i as f32 + 0.5)).min(clm::BIN_DOMAIN_MAX);
            if !(x > 0.0) {
                return Err(AecError::OutOfRange(format!(
                    "rescaled bin {} at non-positive position {}",
                    i, x
                )));
            }
            mean += (16.0 * b as f32 / sum) * x;
        }

        let black = (bl * new_exposure / exposure).min(clm::BLACK_LEVEL_CAP);
        mh = (mean - black).max(f32::EPSILON);
        new_exposure *= sp / mh;
        iterations += 1;

        if new_exposure < bounds.min_exposure {
            new_exposure = bounds.min_exposure;
            break;
        }
        if new_exposure > bounds.max_exposure {
            new_exposure = bounds.max_exposure;
            break;
        }
        if iterations >= clm::MAX_LOOP_ITERATIONS {
            break;
        }

        loop_value = (sp - mh).abs() / sp;
        trace!(iterations, new_exposure, loop_value, "Control loop step");
    }

    Ok(ClmOutcome {
        new_exposure,
        iterations,
        loop_value,
    })
}

/// Run the control loop for one histogram and return the proposed exposure
pub fn execute(ctx: &mut AecContext, set_point: f32, bins: &HistogramBins) -> AecResult<f32> {
    let deviation = luma_deviation(set_point, ctx.mean_luma);
    if !(deviation >= 0.0) {
        return Err(AecError::OutOfRange(format!(
            "luma deviation {} for set-point {}",
            deviation, set_point
        )));
    }
    ctx.luma_deviation = deviation;

    if deviation <= ctx.clm_tolerance / 100.0 {
        return Ok(ctx.exposure);
    }

    ctx.clm_histogram = ClmHistogram::extrapolate(bins);
    let outcome = converge(
        &ctx.clm_histogram,
        set_point,
        ctx.mean_luma,
        ctx.exposure,
        &ctx.bounds,
    )?;

    debug!(
        set_point,
        mean_luma = ctx.mean_luma,
        exposure = ctx.exposure,
        new_exposure = outcome.new_exposure,
        iterations = outcome.iterations,
        "Control loop"
    );

    Ok(outcome.new_exposure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> ExposureBounds {
        ExposureBounds::new(1.0, 8.0, 0.0001, 0.1)
    }

    #[test]
    fn test_no_extrapolation_without_clipping() {
        let mut bins = [10u32; histogram::NUM_BINS];
        bins[15] = 5;
        let hist = ClmHistogram::extrapolate(&bins);
        assert_eq!(hist.size, histogram::NUM_BINS);
        assert_eq!(hist.active(), &bins[..]);
    }

    #[test]
    fn test_extrapolation_triangle_tail() {
        let mut bins = [0u32; histogram::NUM_BINS];
        bins[14] = 10;
        bins[15] = 40;
        let hist = ClmHistogram::extrapolate(&bins);
        // width = 2*40/10 + 1 = 9, height = 80/9 = 8, 8 tail bins
        assert_eq!(hist.size, 15 + 8);
        assert_eq!(hist.bins[15], 8);
        assert_eq!(hist.bins[16], 7);
        assert_eq!(hist.bins[22], 1);
        assert_eq!(hist.bins[23], 0);
    }

    #[test]
    fn test_extrapolation_width_capped() {
        let mut bins = [0u32; histogram::NUM_BINS];
        bins[14] = 1;
        bins[15] = 10_000;
        let hist = ClmHistogram::extrapolate(&bins);
        assert_eq!(hist.size, histogram::CLM_NUM_BINS);
    }

    #[test]
    fn test_mean_of_empty_histogram() {
        let hist = ClmHistogram::extrapolate(&[0; histogram::NUM_BINS]);
        assert_eq!(hist.sum(), 1);
        assert_eq!(hist.mean(), 1.0);
    }

    #[test]
    fn test_mean_in_luma_units() {
        let mut bins = [0u32; histogram::NUM_BINS];
        bins[7] = 100;
        let hist = ClmHistogram::extrapolate(&bins);
        assert_eq!(hist.mean(), 16.0 * 7.5);
    }

    #[test]
    fn test_deviation() {
        assert_eq!(luma_deviation(100.0, 80.0), 0.2);
        assert_eq!(luma_deviation(100.0, 120.0), 0.2);
    }

    #[test]
    fn test_underexposed_scene_increases_exposure() {
        let mut bins = [0u32; histogram::NUM_BINS];
        bins[3] = 100;
        let hist = ClmHistogram::extrapolate(&bins);
        let outcome = converge(&hist, 128.0, 56.0, 0.01, &bounds()).unwrap();
        assert!(outcome.new_exposure > 0.01);
        assert!(outcome.loop_value <= clm::LOOP_ACCURACY);
        // Linear region: 128 / 56
        assert!((outcome.new_exposure / 0.01 - 128.0 / 56.0).abs() < 0.01);
    }

    #[test]
    fn test_saturated_scene_decreases_exposure() {
        let mut bins = [0u32; histogram::NUM_BINS];
        bins[13] = 50;
        bins[14] = 100;
        bins[15] = 400;
        let hist = ClmHistogram::extrapolate(&bins);
        assert!(hist.size > histogram::NUM_BINS);
        let outcome = converge(&hist, 128.0, 240.0, 0.05, &bounds()).unwrap();
        assert!(outcome.new_exposure < 0.05);
        assert!(outcome.iterations <= clm::MAX_LOOP_ITERATIONS);
        assert!(outcome.loop_value <= clm::LOOP_ACCURACY);
    }

    #[test]
    fn test_clamps_to_max_exposure() {
        let mut bins = [0u32; histogram::NUM_BINS];
        bins[0] = 100;
        let hist = ClmHistogram::extrapolate(&bins);
        let b = bounds();
        let outcome = converge(&hist, 128.0, 8.0, b.max_exposure * 0.9, &b).unwrap();
        assert_eq!(outcome.new_exposure, b.max_exposure);
    }

    #[test]
    fn test_rejects_zero_exposure() {
        let hist = ClmHistogram::default();
        assert!(converge(&hist, 128.0, 100.0, 0.0, &bounds()).is_err());
    }

    #[test]
    fn test_execute_inside_tolerance_is_noop() {
        let mut ctx = AecContext::new();
        ctx.bounds = bounds();
        ctx.exposure = 0.02;
        ctx.clm_tolerance = 5.0;
        ctx.mean_luma = 125.0;
        let mut bins = [0u32; histogram::NUM_BINS];
        bins[15] = 1000;
        let new = execute(&mut ctx, 128.0, &bins).unwrap();
        assert_eq!(new, 0.02);
        assert!(ctx.luma_deviation > 0.0 && ctx.luma_deviation <= 0.05);
    }
}
