// SPDX-License-Identifier: GPL-3.0-only

//! Auto exposure control
//!
//! Per frame the pipeline calls [`AecController::sem_execute`] with the 5×5
//! luma grid and then [`AecController::clm_execute`] with the 16-bin tone
//! histogram:
//!
//! ```text
//! luma grid ──► weighted mean ──► SEM / ASEM ──► local set-point
//!                                                     │
//! histogram ────────────────────────────────────► CLM (control loop)
//!                                                     │
//!                                                  damping
//!                                                     │
//!                                                 ECM (gain × time split)
//!                                                     │
//!                                                   AFPS ──► resolution change
//!                                                     │
//!                                                  sensor
//! ```
//!
//! All stages work on one [`AecContext`] owned by the controller.

pub mod afps;
pub mod asem;
pub mod ccl;
pub mod clm;
pub mod context;
pub mod controller;
pub mod ecm;
pub mod sem;

pub use context::{AecContext, ExposureBounds, LimitsSource, SceneState};
pub use controller::{AecController, AecInstance, AecStatus, ResolutionChangeCallback, TryLockOutcome};
pub use ecm::ExposureSplit;

use crate::constants::{grid, histogram};
use std::fmt;

/// Mean luma per grid cell, row-major
pub type LumaGrid = [u8; grid::ITEMS];

/// Per-cell weights for the mean luma, row-major
pub type GridWeights = [u8; grid::ITEMS];

/// 0/1 mask over the grid, row-major
pub type RegionMask = [u8; grid::ITEMS];

/// Tone histogram as delivered by the measurement unit
pub type HistogramBins = [u32; histogram::NUM_BINS];

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AecState {
    /// Never observable from outside
    #[default]
    Invalid,
    Initialized,
    Stopped,
    Running,
    Locked,
}

impl fmt::Display for AecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AecState::Invalid => "Invalid",
            AecState::Initialized => "Initialized",
            AecState::Stopped => "Stopped",
            AecState::Running => "Running",
            AecState::Locked => "Locked",
        };
        f.write_str(name)
    }
}
