// SPDX-License-Identifier: GPL-3.0-only

//! Sensor abstraction consumed by the exposure controller
//!
//! The controller never talks to hardware directly. Everything it needs to
//! know about the image sensor goes through the [`Sensor`] trait:
//!
//! ```text
//! ┌─────────────────────┐
//! │    AecController    │  ← limits, resolution, exposure split
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │     Sensor Trait    │  ← Common interface
//! └──────────┬──────────┘
//!            │
//!     ┌──────┴──────┐
//!     ▼             ▼
//! ┌────────┐  ┌───────────┐
//! │ Driver │  │ Simulated │
//! └────────┘  └───────────┘
//! ```

pub mod profile;
pub mod types;

pub use types::*;

use crate::errors::{SensorError, SensorResult};

/// Image sensor interface
///
/// Implementations report their limits and current mode, and apply the
/// gain/integration-time pairs computed by the controller.
pub trait Sensor: Send {
    // ===== Limits =====

    /// Minimum and maximum analog gain
    fn gain_limits(&self) -> SensorResult<(f32, f32)>;

    /// Minimum and maximum integration time in seconds for the current mode
    fn integration_time_limits(&self) -> SensorResult<(f32, f32)>;

    // ===== Resolution =====

    /// Currently configured sensor mode
    fn resolution(&self) -> SensorResult<ResolutionId>;

    /// Width, height and frame rate of a sensor mode
    fn resolution_params(&self, id: ResolutionId) -> SensorResult<ResolutionParams>;

    /// Automatic frame-period switching stage table
    ///
    /// Sensors without AFPS support keep the default implementation.
    fn afps_info(&self) -> SensorResult<AfpsInfo> {
        Err(SensorError::NotSupported("AFPS".to_string()))
    }

    // ===== Exposure =====

    /// Program gain and integration time
    ///
    /// Returns the values the sensor actually applied (after its own
    /// quantization) and how many frames to skip before they take effect.
    fn apply_exposure(&mut self, gain: f32, integration_time: f32)
    -> SensorResult<AppliedExposure>;

    /// Gain currently programmed
    fn gain(&self) -> SensorResult<f32>;

    /// Integration time currently programmed
    fn integration_time(&self) -> SensorResult<f32>;
}
