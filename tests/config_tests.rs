// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration and calibration loading

use camera_aec::sim::{self, Scenario, SensorModel, SimulatedSensor, SyntheticScene};
use camera_aec::{
    AecCalibration, AecConfig, AecController, AecInstance, CalibrationDb, CalibrationFile,
    DampingMode, FlickerSelect, SemMode,
};

#[test]
fn test_config_default() {
    let config = AecConfig::default();

    assert_eq!(config.sem_mode, SemMode::Fixed);
    assert_eq!(config.damping_mode, DampingMode::Video);
    assert_eq!(config.flicker, FlickerSelect::Hz100);
    assert!(!config.afps_enabled);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_json_round_trip() {
    let config = AecConfig {
        sem_mode: SemMode::Adaptive,
        flicker: FlickerSelect::Hz120,
        grid_weights: Some([2; 25]),
        ..Default::default()
    };

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"Hz120\""));
    let parsed: AecConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_invalid_config_rejected_by_controller() {
    let sensor = SimulatedSensor::new(SensorModel::default());
    let mut aec = AecController::new(AecInstance::new(Box::new(sensor)));
    let config = AecConfig {
        clm_tolerance: -1.0,
        ..Default::default()
    };
    assert!(aec.configure(&config).is_err());
}

fn write_calibration(name: &str, calibration: &AecCalibration) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("{}-{}.json", name, std::process::id()));
    std::fs::write(&path, serde_json::to_string_pretty(calibration).unwrap()).unwrap();
    path
}

#[test]
fn test_calibration_file_partial_json() {
    let path = std::env::temp_dir().join(format!("aec-partial-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "set_point": 100.0, "ecm_dot_enable": true }"#).unwrap();

    let calibration = CalibrationFile::new(&path).aec_global().unwrap();
    assert_eq!(calibration.set_point, 100.0);
    assert_eq!(calibration.clm_tolerance, 5.0);
    assert!(calibration.custom_grid_weights().is_none());
    assert!(calibration.dot_table().is_some());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_calibration_file_malformed() {
    let path = std::env::temp_dir().join(format!("aec-bad-{}.json", std::process::id()));
    std::fs::write(&path, "{ not json").unwrap();

    assert!(CalibrationFile::new(&path).aec_global().is_err());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_calibration_overrides_config() {
    let calibration = AecCalibration {
        set_point: 90.0,
        clm_tolerance: 2.0,
        ..Default::default()
    };
    let path = write_calibration("aec-override", &calibration);

    let sensor = SimulatedSensor::new(SensorModel::default());
    let instance = AecInstance::new(Box::new(sensor))
        .with_calibration(Box::new(CalibrationFile::new(&path)));
    let mut aec = AecController::new(instance);
    aec.configure(&AecConfig::default()).unwrap();

    let status = aec.status();
    assert_eq!(status.set_point, 90.0);
    assert_eq!(status.clm_tolerance, 2.0);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_dot_table_caps_integration_time_in_closed_loop() {
    let calibration = AecCalibration {
        ecm_dot_enable: true,
        ..Default::default()
    };
    let scenario = Scenario {
        scene: SyntheticScene {
            radiance: [200.0; 25],
            ..Default::default()
        },
        frames: 20,
        ..Default::default()
    };

    let reports = sim::run(&scenario, Some(Box::new(calibration))).unwrap();
    assert_eq!(reports.len(), 20);
    for report in &reports {
        assert!(report.integration_time <= 0.03 + 1e-6);
        assert!(report.gain <= 8.0 + 1e-4);
    }
}
