// SPDX-License-Identifier: GPL-3.0-only

//! Exposure controller state machine
//!
//! ```text
//!              configure                 start
//! Initialized ───────────► Initialized ─────────► Running ◄──┐
//!                                                  │  ▲      │ unlock
//!                                         stop     │  │      │
//!                               Stopped ◄──────────┘  │   try_lock (settled)
//!                                  │        start     │      │
//!                                  └──────────────────┘   Locked
//! ```
//!
//! `configure` is accepted in Initialized and Stopped, `reconfigure` in
//! Stopped, Running and Locked. Frames are only evaluated while Running;
//! in any other state the measurements are stored and nothing else happens.

use super::context::{ExposureBounds, LimitsSource, SceneState, weighted_mean_luma};
use super::ecm::ExposureSplit;
use super::{
    AecContext, AecState, GridWeights, HistogramBins, LumaGrid, RegionMask, afps, asem, clm, ecm,
    sem,
};
use crate::calibration::CalibrationDb;
use crate::config::{AecConfig, DampingCoefficients, DampingMode, SemMode};
use crate::constants::grid;
use crate::errors::{AecError, AecResult, SensorError};
use crate::sensor::profile::{EcmProfile, ecm_profile};
use crate::sensor::{AfpsInfo, ResolutionId, Sensor};
use tracing::{debug, info, trace, warn};

/// Invoked with the new sensor mode whenever AFPS requests a switch
pub type ResolutionChangeCallback = Box<dyn FnMut(ResolutionId) + Send>;

/// Collaborators handed to the controller at creation
pub struct AecInstance {
    pub sensor: Box<dyn Sensor>,
    /// Second sensor of a stereo pair, programmed with the same values
    pub sub_sensor: Option<Box<dyn Sensor>>,
    pub calibration: Option<Box<dyn CalibrationDb>>,
    pub on_resolution_change: Option<ResolutionChangeCallback>,
}

impl AecInstance {
    pub fn new(sensor: Box<dyn Sensor>) -> Self {
        Self {
            sensor,
            sub_sensor: None,
            calibration: None,
            on_resolution_change: None,
        }
    }

    pub fn with_sub_sensor(mut self, sensor: Box<dyn Sensor>) -> Self {
        self.sub_sensor = Some(sensor);
        self
    }

    pub fn with_calibration(mut self, calibration: Box<dyn CalibrationDb>) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn on_resolution_change(mut self, callback: impl FnMut(ResolutionId) + Send + 'static) -> Self {
        self.on_resolution_change = Some(Box::new(callback));
        self
    }
}

/// Result of [`AecController::try_lock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryLockOutcome {
    /// Controller is locked (or stopped, which counts as locked)
    Acquired,
    /// Not settled yet, try again on a later frame
    Pending,
}

/// Snapshot of the controller's tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AecStatus {
    /// Running or Locked
    pub running: bool,
    pub sem_mode: SemMode,
    pub set_point: f32,
    pub clm_tolerance: f32,
    pub damping_mode: DampingMode,
    pub damping: DampingCoefficients,
}

/// Auto exposure controller for one sensor pipeline
pub struct AecController {
    instance: AecInstance,
    ctx: AecContext,
}

impl AecController {
    pub fn new(instance: AecInstance) -> Self {
        debug!("Exposure controller created");
        Self {
            instance,
            ctx: AecContext::new(),
        }
    }

    /// Tear down the controller and hand back its collaborators
    ///
    /// Refused with [`AecError::Busy`] while Running or Locked; the
    /// controller is returned unchanged in that case.
    pub fn release(self) -> Result<AecInstance, (AecError, Self)> {
        match self.ctx.state {
            AecState::Running | AecState::Locked => Err((AecError::Busy, self)),
            _ => {
                debug!("Exposure controller released");
                Ok(self.instance)
            }
        }
    }

    // ===== Configuration =====

    /// Full configuration: limits, profile, tuning and start exposure
    ///
    /// The start exposure is pushed to the sensor immediately.
    pub fn configure(&mut self, config: &AecConfig) -> AecResult<()> {
        config.validate()?;
        self.require("configure", &[AecState::Initialized, AecState::Stopped])?;

        self.update_config(config, false)?;

        let exposure = self.ctx.exposure;
        let split = ecm::execute(&mut self.ctx, exposure)?;
        self.sensor_control(exposure, split, None)?;

        info!(
            sem_mode = config.sem_mode.display_name(),
            set_point = self.ctx.set_point,
            flicker = config.flicker.display_name(),
            exposure = self.ctx.exposure,
            min_exposure = self.ctx.bounds.min_exposure,
            max_exposure = self.ctx.bounds.max_exposure,
            "Exposure control configured"
        );
        Ok(())
    }

    /// Update tuning and limits while keeping the current exposure
    ///
    /// Returns the number of frames to skip before the sensor shows the
    /// re-split exposure (0 while Stopped).
    pub fn reconfigure(&mut self, config: &AecConfig) -> AecResult<u32> {
        config.validate()?;
        self.require(
            "reconfigure",
            &[AecState::Stopped, AecState::Running, AecState::Locked],
        )?;

        self.update_config(config, true)?;

        if self.ctx.state == AecState::Stopped {
            return Ok(0);
        }

        let exposure = self.ctx.exposure;
        let split = ecm::execute_direct(&mut self.ctx, exposure)?;
        let frames_to_skip = self.sensor_control(exposure, split, None)?;
        debug!(exposure, frames_to_skip, "Exposure control reconfigured");
        Ok(frames_to_skip)
    }

    fn update_config(&mut self, config: &AecConfig, mut is_reconfig: bool) -> AecResult<()> {
        let sensor = self.instance.sensor.as_ref();
        let ctx = &mut self.ctx;

        if ctx.flicker != config.flicker || ctx.afps.enabled != config.afps_enabled {
            // Flicker-free operation needs a fresh start exposure
            if is_reconfig {
                debug!("Flicker or AFPS selection changed, running full configuration");
            }
            is_reconfig = false;
        }

        let previous_mode = ctx.sem_mode;
        ctx.sem_mode = config.sem_mode;
        ctx.afps.enabled = config.afps_enabled;
        ctx.flicker = config.flicker;
        ctx.flicker_period = config.flicker.period();
        ctx.damping_mode = config.damping_mode;

        apply_tuning(ctx, config);

        if is_reconfig {
            if previous_mode != config.sem_mode {
                ctx.sem_set_point = config.set_point;
                ctx.scene = SceneState::for_mode(config.sem_mode);
            }
        } else {
            ctx.profile = EcmProfile::default();
            ctx.afps.current_resolution = None;
            ctx.dot_table = None;
            ctx.grid_weights = config.grid_weights.unwrap_or(grid::DEFAULT_WEIGHTS);

            if let Some(db) = self.instance.calibration.as_ref() {
                let calibration = db.aec_global()?;
                ctx.set_point = calibration.set_point;
                ctx.clm_tolerance = calibration.clm_tolerance;
                ctx.damping = calibration.damping;
                ctx.afps.max_gain = calibration.afps_max_gain;
                if let Some(weights) = calibration.custom_grid_weights() {
                    ctx.grid_weights = weights;
                }
                ctx.dot_table = calibration.dot_table();
                debug!(
                    set_point = calibration.set_point,
                    dot_table = ctx.dot_table.is_some(),
                    "Applied calibration"
                );
            }

            ctx.sem_set_point = ctx.set_point;
            ctx.scene = SceneState::for_mode(config.sem_mode);
        }

        // Limits: dot table, then AFPS, then the sensor itself
        let mut source = LimitsSource::Sensor;
        let mut bounds = ExposureBounds::default();

        if let Some(table) = ctx.dot_table.as_ref() {
            source = LimitsSource::DotTable;
            bounds = ExposureBounds::new(
                table.min_gain(),
                table.max_gain(),
                table.min_integration_time(),
                table.max_integration_time(),
            );
        }

        ctx.afps.info = AfpsInfo::default();
        if ctx.afps.enabled {
            match sensor.afps_info() {
                Ok(afps_info) => {
                    ctx.afps.current_resolution = afps_info.current_resolution;
                    if afps_info.has_stages() {
                        source = LimitsSource::Afps;
                        let max_gain = if afps_info.min_gain <= ctx.afps.max_gain {
                            ctx.afps.max_gain.min(afps_info.max_gain)
                        } else {
                            afps_info.max_gain
                        };
                        bounds = ExposureBounds::new(
                            afps_info.min_gain,
                            max_gain,
                            afps_info.min_integration_time,
                            afps_info.max_integration_time,
                        );
                    }
                    ctx.afps.info = afps_info;
                }
                Err(SensorError::NotSupported(msg)) => {
                    warn!(%msg, "Sensor has no AFPS support, using sensor limits");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let (sensor_min_gain, sensor_max_gain) = sensor.gain_limits()?;
        let (sensor_min_it, sensor_max_it) = sensor.integration_time_limits()?;
        if source == LimitsSource::Sensor {
            bounds = ExposureBounds::new(
                sensor_min_gain,
                sensor_max_gain,
                sensor_min_it,
                sensor_max_it,
            );
        }

        let resolution = sensor.resolution()?;
        let params = sensor.resolution_params(resolution)?;
        ctx.profile = ecm_profile(
            params,
            sensor_max_it,
            bounds.max_integration_time,
            ctx.flicker_period,
        )?;

        ctx.bounds = bounds;
        ctx.limits_source = source;

        if is_reconfig {
            ctx.exposure = bounds.clamp_exposure(ctx.exposure);
        } else {
            let start = match source {
                LimitsSource::Afps => {
                    let afps_info = &ctx.afps.info;
                    (afps_info.min_gain * afps_info.current_min_integration_time
                        + afps_info.max_gain * afps_info.current_max_integration_time)
                        / 2.0
                }
                LimitsSource::Sensor | LimitsSource::DotTable => bounds.midpoint(),
            };
            ctx.start_exposure = bounds.clamp_exposure(start);
            ctx.exposure = ctx.start_exposure;
            ctx.invalidate_ecm_lock();
        }

        debug!(
            ?source,
            mode = %params,
            min_gain = bounds.min_gain,
            max_gain = bounds.max_gain,
            min_integration_time = bounds.min_integration_time,
            max_integration_time = bounds.max_integration_time,
            t0 = ctx.profile.t0,
            a0 = ctx.profile.a0,
            "Exposure limits updated"
        );
        Ok(())
    }

    /// Program the split into the sensor(s) and record what was applied
    fn sensor_control(
        &mut self,
        new_exposure: f32,
        split: ExposureSplit,
        new_resolution: Option<ResolutionId>,
    ) -> AecResult<u32> {
        let applied = self
            .instance
            .sensor
            .apply_exposure(split.gain, split.integration_time)?;

        if let Some(sub_sensor) = self.instance.sub_sensor.as_mut() {
            sub_sensor.apply_exposure(split.gain, split.integration_time)?;
        }

        let ctx = &mut self.ctx;
        match new_resolution {
            None => {
                ctx.gain = applied.gain;
                ctx.integration_time = applied.integration_time;
                ctx.exposure = ctx
                    .bounds
                    .clamp_exposure(applied.gain * applied.integration_time);
            }
            // The sensor values will change with the mode; keep the computed ones
            Some(_) => {
                ctx.gain = split.gain;
                ctx.integration_time = split.integration_time;
                ctx.exposure = new_exposure;
            }
        }

        trace!(
            exposure = ctx.exposure,
            gain = ctx.gain,
            integration_time = ctx.integration_time,
            frames_to_skip = applied.frames_to_skip,
            "Sensor updated"
        );

        if let Some(resolution) = new_resolution {
            if let Some(callback) = self.instance.on_resolution_change.as_mut() {
                callback(resolution);
            }
        }

        Ok(applied.frames_to_skip)
    }

    // ===== State transitions =====

    pub fn start(&mut self) -> AecResult<()> {
        if matches!(self.ctx.state, AecState::Running | AecState::Locked) {
            return Err(self.wrong_state("start"));
        }
        self.ctx.state = AecState::Running;
        info!("Exposure control started");
        Ok(())
    }

    pub fn stop(&mut self) -> AecResult<()> {
        if self.ctx.state == AecState::Locked {
            return Err(self.wrong_state("stop"));
        }
        self.ctx.state = AecState::Stopped;
        info!("Exposure control stopped");
        Ok(())
    }

    /// Reload calibrated tuning and restart from the midpoint exposure
    pub fn reset(&mut self) -> AecResult<()> {
        if self.ctx.state == AecState::Locked {
            return Err(self.wrong_state("reset"));
        }

        if let Some(db) = self.instance.calibration.as_ref() {
            let calibration = db.aec_global()?;
            self.ctx.set_point = calibration.set_point;
            self.ctx.clm_tolerance = calibration.clm_tolerance;
            self.ctx.damping = calibration.damping;
        }

        self.ctx.start_exposure = self.ctx.bounds.midpoint();
        self.ctx.exposure = self.ctx.start_exposure;
        self.ctx.invalidate_ecm_lock();
        debug!(exposure = self.ctx.exposure, "Exposure control reset");
        Ok(())
    }

    /// Freeze adjustment once the exposure has settled
    pub fn try_lock(&mut self) -> AecResult<TryLockOutcome> {
        match self.ctx.state {
            AecState::Stopped => Ok(TryLockOutcome::Acquired),
            AecState::Running | AecState::Locked => {
                if self.ctx.settled() {
                    self.ctx.state = AecState::Locked;
                    debug!(deviation = self.ctx.luma_deviation, "Exposure locked");
                    Ok(TryLockOutcome::Acquired)
                } else {
                    Ok(TryLockOutcome::Pending)
                }
            }
            _ => Err(self.wrong_state("try_lock")),
        }
    }

    pub fn unlock(&mut self) -> AecResult<()> {
        match self.ctx.state {
            AecState::Locked | AecState::Running => {
                self.ctx.state = AecState::Running;
                Ok(())
            }
            AecState::Stopped => Ok(()),
            _ => Err(self.wrong_state("unlock")),
        }
    }

    fn wrong_state(&self, operation: &'static str) -> AecError {
        AecError::WrongState {
            operation,
            state: self.ctx.state,
        }
    }

    fn require(&self, operation: &'static str, allowed: &[AecState]) -> AecResult<()> {
        if allowed.contains(&self.ctx.state) {
            Ok(())
        } else {
            Err(self.wrong_state(operation))
        }
    }

    // ===== Per-frame processing =====

    /// Feed the 5×5 luma grid of the latest frame
    pub fn sem_execute(&mut self, luma: &LumaGrid) -> AecResult<()> {
        self.ctx.luma = *luma;

        if self.ctx.state != AecState::Running {
            return Ok(());
        }

        let mean_luma = weighted_mean_luma(luma, &self.ctx.grid_weights)?;
        if mean_luma == 0.0 {
            return Err(AecError::OutOfRange("weighted mean luma is zero".to_string()));
        }
        self.ctx.mean_luma = mean_luma;

        match self.ctx.sem_mode {
            SemMode::Disabled => {}
            SemMode::Fixed => sem::execute(&mut self.ctx, luma),
            SemMode::Adaptive => asem::execute(&mut self.ctx, luma),
        }

        trace!(
            set_point = self.ctx.set_point,
            sem_set_point = self.ctx.sem_set_point,
            mean_luma,
            "Scene evaluated"
        );
        Ok(())
    }

    /// Feed the 16-bin histogram of the latest frame and update the sensor
    pub fn clm_execute(&mut self, bins: &HistogramBins) -> AecResult<()> {
        self.ctx.histogram = *bins;

        if self.ctx.state != AecState::Running {
            return Ok(());
        }

        let set_point = self.ctx.active_set_point();
        let proposed = clm::execute(&mut self.ctx, set_point, bins)?;

        let overexposed = self.ctx.mean_luma > set_point;
        let damping = self.ctx.damping.select(self.ctx.damping_mode, overexposed);
        let new_exposure = proposed * (1.0 - damping) + self.ctx.exposure * damping;

        let split = ecm::execute(&mut self.ctx, new_exposure)?;
        let new_resolution = afps::execute(
            &mut self.ctx,
            self.instance.sensor.as_ref(),
            split.integration_time,
        )?;

        trace!(
            proposed,
            damping,
            new_exposure,
            gain = split.gain,
            integration_time = split.integration_time,
            "Exposure step"
        );

        if new_exposure != self.ctx.exposure || new_resolution.is_some() {
            self.sensor_control(new_exposure, split, new_resolution)?;
        }
        Ok(())
    }

    /// Close enough to the set-point, or out of headroom
    pub fn settled(&self) -> bool {
        self.ctx.settled()
    }

    // ===== Accessors =====

    pub fn state(&self) -> AecState {
        self.ctx.state
    }

    pub fn exposure(&self) -> f32 {
        self.ctx.exposure
    }

    /// Read-only view of the working state
    pub fn context(&self) -> &AecContext {
        &self.ctx
    }

    /// Gain in effect: the controller's value while active, else the sensor's
    pub fn gain(&self) -> AecResult<f32> {
        match self.ctx.state {
            AecState::Running | AecState::Locked => Ok(self.ctx.gain),
            _ => Ok(self.instance.sensor.gain()?),
        }
    }

    /// Integration time in effect: the controller's value while active, else the sensor's
    pub fn integration_time(&self) -> AecResult<f32> {
        match self.ctx.state {
            AecState::Running | AecState::Locked => Ok(self.ctx.integration_time),
            _ => Ok(self.instance.sensor.integration_time()?),
        }
    }

    /// Last histogram passed to [`clm_execute`](Self::clm_execute)
    pub fn histogram(&self) -> &HistogramBins {
        &self.ctx.histogram
    }

    /// Last luma grid passed to [`sem_execute`](Self::sem_execute)
    pub fn luminance(&self) -> &LumaGrid {
        &self.ctx.luma
    }

    /// Detected subject cells; all ones unless running adaptive evaluation
    pub fn object_region(&self) -> RegionMask {
        match (&self.ctx.state, &self.ctx.scene) {
            (AecState::Running, SceneState::Adaptive(scene)) => scene.object_region,
            _ => [1; grid::ITEMS],
        }
    }

    pub fn clm_tolerance(&self) -> f32 {
        self.ctx.clm_tolerance
    }

    pub fn set_clm_tolerance(&mut self, tolerance: f32) -> AecResult<()> {
        if !(tolerance >= 0.0) {
            return Err(AecError::InvalidArgument(format!(
                "tolerance must not be negative, got {}",
                tolerance
            )));
        }
        self.ctx.clm_tolerance = tolerance;
        Ok(())
    }

    pub fn grid_weights(&self) -> &GridWeights {
        &self.ctx.grid_weights
    }

    /// Replace the mean luma weights; not allowed while Running
    pub fn set_grid_weights(&mut self, weights: &GridWeights) -> AecResult<()> {
        if self.ctx.state == AecState::Running {
            return Err(self.wrong_state("set_grid_weights"));
        }
        self.ctx.grid_weights = *weights;
        Ok(())
    }

    /// Configuration as currently in effect, calibration overrides included
    pub fn current_config(&self) -> AecConfig {
        AecConfig {
            sem_mode: self.ctx.sem_mode,
            set_point: self.ctx.set_point,
            clm_tolerance: self.ctx.clm_tolerance,
            damping_mode: self.ctx.damping_mode,
            damping: self.ctx.damping,
            flicker: self.ctx.flicker,
            afps_enabled: self.ctx.afps.enabled,
            afps_max_gain: self.ctx.afps.max_gain,
            grid_weights: Some(self.ctx.grid_weights),
        }
    }

    pub fn status(&self) -> AecStatus {
        AecStatus {
            running: matches!(self.ctx.state, AecState::Running | AecState::Locked),
            sem_mode: self.ctx.sem_mode,
            set_point: self.ctx.set_point,
            clm_tolerance: self.ctx.clm_tolerance,
            damping_mode: self.ctx.damping_mode,
            damping: self.ctx.damping,
        }
    }
}

fn apply_tuning(ctx: &mut AecContext, config: &AecConfig) {
    ctx.set_point = config.set_point;
    ctx.clm_tolerance = config.clm_tolerance;
    ctx.damping = config.damping;
    ctx.afps.max_gain = config.afps_max_gain;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::AecCalibration;
    use crate::errors::SensorResult;
    use crate::sensor::{AppliedExposure, ResolutionParams};

    /// VGA sensor that applies whatever it is given
    struct VgaSensor {
        gain: f32,
        integration_time: f32,
    }

    impl VgaSensor {
        fn boxed() -> Box<dyn Sensor> {
            Box::new(Self {
                gain: 1.0,
                integration_time: 0.01,
            })
        }
    }

    impl Sensor for VgaSensor {
        fn gain_limits(&self) -> SensorResult<(f32, f32)> {
            Ok((1.0, 8.0))
        }
        fn integration_time_limits(&self) -> SensorResult<(f32, f32)> {
            Ok((0.0001, 0.033))
        }
        fn resolution(&self) -> SensorResult<ResolutionId> {
            Ok(ResolutionId(1))
        }
        fn resolution_params(&self, _id: ResolutionId) -> SensorResult<ResolutionParams> {
            Ok(ResolutionParams {
                width: 640,
                height: 480,
                fps: 30,
            })
        }
        fn apply_exposure(
            &mut self,
            gain: f32,
            integration_time: f32,
        ) -> SensorResult<AppliedExposure> {
            self.gain = gain;
            self.integration_time = integration_time;
            Ok(AppliedExposure {
                frames_to_skip: 2,
                gain,
                integration_time,
            })
        }
        fn gain(&self) -> SensorResult<f32> {
            Ok(self.gain)
        }
        fn integration_time(&self) -> SensorResult<f32> {
            Ok(self.integration_time)
        }
    }

    fn controller() -> AecController {
        AecController::new(AecInstance::new(VgaSensor::boxed()))
    }

    fn configured() -> AecController {
        let mut aec = controller();
        aec.configure(&AecConfig::default()).unwrap();
        aec
    }

    #[test]
    fn test_new_controller_is_initialized() {
        let aec = controller();
        assert_eq!(aec.state(), AecState::Initialized);
        assert_eq!(aec.grid_weights(), &grid::DEFAULT_WEIGHTS);
    }

    #[test]
    fn test_configure_starts_at_midpoint() {
        let aec = configured();
        let bounds = aec.context().bounds;
        assert_eq!(bounds.min_gain, 1.0);
        assert_eq!(bounds.max_integration_time, 0.033);
        let expected = bounds.midpoint();
        assert!((aec.exposure() - expected).abs() < 1e-4);
        assert!(aec.context().ecm_lock.is_some());
        assert_eq!(aec.state(), AecState::Initialized);
    }

    #[test]
    fn test_configure_rejects_invalid_config() {
        let mut aec = controller();
        let config = AecConfig {
            set_point: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            aec.configure(&config),
            Err(AecError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_configure_wrong_state() {
        let mut aec = configured();
        aec.start().unwrap();
        assert!(matches!(
            aec.configure(&AecConfig::default()),
            Err(AecError::WrongState { .. })
        ));
    }

    #[test]
    fn test_reconfigure_requires_configured_state() {
        let mut aec = controller();
        assert!(aec.reconfigure(&AecConfig::default()).is_err());

        let mut aec = configured();
        aec.stop().unwrap();
        assert_eq!(aec.reconfigure(&AecConfig::default()).unwrap(), 0);

        aec.start().unwrap();
        assert_eq!(aec.reconfigure(&AecConfig::default()).unwrap(), 2);
    }

    #[test]
    fn test_reconfigure_keeps_exposure() {
        let mut aec = configured();
        aec.start().unwrap();
        aec.ctx.exposure = 0.05;
        let config = AecConfig {
            set_point: 100.0,
            ..Default::default()
        };
        aec.reconfigure(&config).unwrap();
        assert!((aec.exposure() - 0.05).abs() < 1e-4);
        assert_eq!(aec.context().set_point, 100.0);
    }

    #[test]
    fn test_flicker_change_restarts_exposure() {
        let mut aec = configured();
        aec.start().unwrap();
        aec.ctx.exposure = 0.05;
        let config = AecConfig {
            flicker: crate::constants::FlickerSelect::Hz120,
            ..Default::default()
        };
        aec.reconfigure(&config).unwrap();
        let midpoint = aec.context().bounds.midpoint();
        assert!((aec.exposure() - midpoint).abs() < 1e-3);
    }

    #[test]
    fn test_state_transitions() {
        let mut aec = configured();
        aec.start().unwrap();
        assert_eq!(aec.state(), AecState::Running);
        assert!(aec.start().is_err());

        aec.stop().unwrap();
        assert_eq!(aec.state(), AecState::Stopped);
        assert_eq!(aec.try_lock().unwrap(), TryLockOutcome::Acquired);
        assert_eq!(aec.state(), AecState::Stopped);
        aec.unlock().unwrap();
        assert_eq!(aec.state(), AecState::Stopped);

        aec.start().unwrap();
        assert_eq!(aec.state(), AecState::Running);
    }

    #[test]
    fn test_locked_state_guards() {
        let mut aec = configured();
        aec.start().unwrap();
        aec.ctx.luma_deviation = 0.1;
        assert_eq!(aec.try_lock().unwrap(), TryLockOutcome::Acquired);
        assert_eq!(aec.state(), AecState::Locked);

        assert!(aec.stop().is_err());
        assert!(aec.reset().is_err());
        assert!(aec.start().is_err());

        aec.unlock().unwrap();
        assert_eq!(aec.state(), AecState::Running);
    }

    #[test]
    fn test_try_lock_pending_when_unsettled() {
        let mut aec = configured();
        aec.start().unwrap();
        aec.ctx.luma_deviation = 0.5;
        aec.ctx.exposure = aec.ctx.bounds.min_exposure;
        assert!(!aec.settled());
        assert_eq!(aec.try_lock().unwrap(), TryLockOutcome::Pending);
        assert_eq!(aec.state(), AecState::Running);
    }

    #[test]
    fn test_try_lock_wrong_state() {
        let mut aec = controller();
        assert!(matches!(
            aec.try_lock(),
            Err(AecError::WrongState { .. })
        ));
        assert!(aec.unlock().is_err());
    }

    #[test]
    fn test_release_refused_while_running() {
        let mut aec = configured();
        aec.start().unwrap();
        let (err, mut aec) = match aec.release() {
            Err(refused) => refused,
            Ok(_) => panic!("release should be refused while running"),
        };
        assert_eq!(err, AecError::Busy);
        aec.stop().unwrap();
        assert!(aec.release().is_ok());
    }

    #[test]
    fn test_sem_execute_stores_snapshot_when_idle() {
        let mut aec = configured();
        aec.sem_execute(&[42; grid::ITEMS]).unwrap();
        assert_eq!(aec.luminance(), &[42; grid::ITEMS]);
        assert_eq!(aec.context().mean_luma, 0.0);
    }

    #[test]
    fn test_sem_execute_zero_weights() {
        let mut aec = configured();
        aec.set_grid_weights(&[0; grid::ITEMS]).unwrap();
        aec.start().unwrap();
        assert!(matches!(
            aec.sem_execute(&[100; grid::ITEMS]),
            Err(AecError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_sem_execute_black_frame() {
        let mut aec = configured();
        aec.start().unwrap();
        assert!(matches!(
            aec.sem_execute(&[0; grid::ITEMS]),
            Err(AecError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_set_grid_weights_refused_while_running() {
        let mut aec = configured();
        aec.start().unwrap();
        assert!(aec.set_grid_weights(&[1; grid::ITEMS]).is_err());
    }

    #[test]
    fn test_object_region_defaults_to_full_grid() {
        let mut aec = configured();
        assert_eq!(aec.object_region(), [1; grid::ITEMS]);
        aec.start().unwrap();
        aec.sem_execute(&[100; grid::ITEMS]).unwrap();
        assert_eq!(aec.object_region(), [1; grid::ITEMS]);
    }

    #[test]
    fn test_gain_source_depends_on_state() {
        let mut aec = configured();
        aec.ctx.gain = 99.0;
        // Not active: sensor value
        assert_ne!(aec.gain().unwrap(), 99.0);
        aec.start().unwrap();
        assert_eq!(aec.gain().unwrap(), 99.0);
    }

    #[test]
    fn test_calibration_overrides_config() {
        let calibration = AecCalibration {
            set_point: 90.0,
            clm_tolerance: 8.0,
            ..Default::default()
        };
        let mut aec = AecController::new(
            AecInstance::new(VgaSensor::boxed()).with_calibration(Box::new(calibration)),
        );
        aec.configure(&AecConfig::default()).unwrap();
        let config = aec.current_config();
        assert_eq!(config.set_point, 90.0);
        assert_eq!(config.clm_tolerance, 8.0);
        assert_eq!(aec.context().sem_set_point, 90.0);
    }

    #[test]
    fn test_dot_table_limits() {
        let calibration = AecCalibration {
            ecm_dot_enable: true,
            ..Default::default()
        };
        let mut aec = AecController::new(
            AecInstance::new(VgaSensor::boxed()).with_calibration(Box::new(calibration)),
        );
        aec.configure(&AecConfig::default()).unwrap();
        let ctx = aec.context();
        assert_eq!(ctx.limits_source, LimitsSource::DotTable);
        assert_eq!(ctx.bounds.max_gain, 8.0);
        assert_eq!(ctx.bounds.max_integration_time, 0.03);
        assert_eq!(ctx.bounds.min_exposure, 0.0);
    }

    #[test]
    fn test_reset_restores_midpoint() {
        let mut aec = configured();
        aec.ctx.exposure = 0.01;
        aec.reset().unwrap();
        assert_eq!(aec.exposure(), aec.context().bounds.midpoint());
        assert!(aec.context().ecm_lock.is_none());
    }

    #[test]
    fn test_status_reports_damping_unswapped() {
        let aec = configured();
        let status = aec.status();
        assert!(!status.running);
        assert_eq!(status.damping, DampingCoefficients::default());
        assert_eq!(status.damping.under_video, 0.7);
    }

    #[test]
    fn test_tolerance_accessors() {
        let mut aec = configured();
        aec.set_clm_tolerance(10.0).unwrap();
        assert_eq!(aec.clm_tolerance(), 10.0);
        assert!(aec.set_clm_tolerance(-1.0).is_err());
    }
}
