// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for sensor implementations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque sensor mode identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolutionId(pub u32);

impl fmt::Display for ResolutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Geometry and frame rate of a sensor mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolutionParams {
    pub width: u16,
    pub height: u16,
    pub fps: u16,
}

impl fmt::Display for ResolutionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

/// Result of programming an exposure into the sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedExposure {
    /// Frames to drop before the new values are visible
    pub frames_to_skip: u32,
    /// Gain actually applied
    pub gain: f32,
    /// Integration time actually applied
    pub integration_time: f32,
}

/// One AFPS stage: a sensor mode and the longest integration time it allows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AfpsStage {
    pub resolution: ResolutionId,
    pub max_integration_time: f32,
}

/// AFPS capability report
///
/// Stages are ordered fastest first, i.e. by increasing maximum
/// integration time. The overall limits cover all stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AfpsInfo {
    pub stages: Vec<AfpsStage>,
    /// Mode the sensor is in right now
    pub current_resolution: Option<ResolutionId>,
    pub min_gain: f32,
    pub max_gain: f32,
    pub min_integration_time: f32,
    pub max_integration_time: f32,
    /// Integration time limits of the current mode
    pub current_min_integration_time: f32,
    pub current_max_integration_time: f32,
}

impl AfpsInfo {
    pub fn has_stages(&self) -> bool {
        !self.stages.is_empty()
    }
}
