// SPDX-License-Identifier: GPL-3.0-only

//! Camera AEC - Auto exposure control for camera image pipelines
//!
//! This library keeps the mean brightness of a camera stream at a target
//! level by adjusting sensor gain and integration time from per-frame
//! luma statistics.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`aec`]: Controller state machine and the per-frame control stages
//! - [`sensor`]: Sensor abstraction and per-mode exposure profiles
//! - [`config`]: Controller configuration
//! - [`calibration`]: Calibration database access
//! - [`sim`]: Simulated sensor and synthetic scenes for closed-loop runs
//!
//! # Example
//!
//! ```
//! use camera_aec::sim::{SensorModel, SimulatedSensor, SyntheticScene};
//! use camera_aec::{AecConfig, AecController, AecInstance};
//!
//! let sensor = SimulatedSensor::new(SensorModel::default());
//! let mut aec = AecController::new(AecInstance::new(Box::new(sensor.clone())));
//! aec.configure(&AecConfig::default())?;
//! aec.start()?;
//!
//! let scene = SyntheticScene::default();
//! for _ in 0..10 {
//!     let (luma, histogram) = scene.measure(sensor.exposure());
//!     aec.sem_execute(&luma)?;
//!     aec.clm_execute(&histogram)?;
//! }
//! # Ok::<(), camera_aec::AecError>(())
//! ```

pub mod aec;
pub mod calibration;
pub mod config;
pub mod constants;
pub mod errors;
pub mod sensor;
pub mod sim;

// Re-export commonly used types
pub use aec::{AecController, AecInstance, AecState, AecStatus, TryLockOutcome};
pub use calibration::{AecCalibration, CalibrationDb, CalibrationFile};
pub use config::{AecConfig, DampingMode, SemMode};
pub use constants::FlickerSelect;
pub use errors::{AecError, AecResult, CalibrationError, SensorError, SensorResult};
pub use sensor::Sensor;
