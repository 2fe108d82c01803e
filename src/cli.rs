// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the exposure simulator
//!
//! This module provides command-line functionality for:
//! - Running scenarios in closed loop
//! - Printing default configuration
//! - Inspecting per-mode exposure profiles

use camera_aec::sensor::ResolutionParams;
use camera_aec::sensor::profile::ecm_profile;
use camera_aec::sim::{self, FrameReport, Scenario};
use camera_aec::{AecCalibration, AecConfig, CalibrationDb, CalibrationFile, FlickerSelect};
use std::path::{Path, PathBuf};
use tracing::info;

/// Run a scenario file and print the per-frame controller state
pub fn run_scenario(
    path: &Path,
    frames: Option<u32>,
    json: bool,
    calibration: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read scenario {}: {}", path.display(), e))?;
    let mut scenario: Scenario = serde_json::from_str(&contents)
        .map_err(|e| format!("Invalid scenario {}: {}", path.display(), e))?;

    if let Some(frames) = frames {
        scenario.frames = frames;
    }

    let calibration = resolve_calibration(calibration);
    let reports = sim::run(&scenario, calibration)?;

    if json {
        for report in &reports {
            println!("{}", serde_json::to_string(report)?);
        }
    } else {
        print_table(&reports);
    }

    Ok(())
}

/// Explicit path, else the default location if a file exists there
fn resolve_calibration(path: Option<PathBuf>) -> Option<Box<dyn CalibrationDb>> {
    let path = path.or_else(|| CalibrationFile::default_path().filter(|p| p.exists()))?;
    info!(path = %path.display(), "Using calibration file");
    Some(Box::new(CalibrationFile::new(path)))
}

fn print_table(reports: &[FrameReport]) {
    println!(
        "{:>5}  {:>6}  {:>9}  {:>6}  {:>8}  {:>10}  {}",
        "frame", "luma", "exposure", "gain", "time ms", "mode", "state"
    );
    for report in reports {
        println!(
            "{:>5}  {:>6.1}  {:>9.5}  {:>6.2}  {:>8.2}  {:>10}  {}",
            report.frame,
            report.mean_luma,
            report.exposure,
            report.gain,
            report.integration_time * 1000.0,
            report.resolution.to_string(),
            if report.locked { "locked" } else { "running" }
        );
    }

    if let Some(last) = reports.last() {
        println!();
        println!(
            "Final: luma {:.1}, gain {:.2}, integration time {:.2} ms",
            last.mean_luma,
            last.gain,
            last.integration_time * 1000.0
        );
    }
}

/// Print default configuration and calibration as JSON
pub fn print_defaults() -> Result<(), Box<dyn std::error::Error>> {
    println!("Configuration:");
    println!("{}", serde_json::to_string_pretty(&AecConfig::default())?);
    println!();
    println!("Calibration:");
    println!("{}", serde_json::to_string_pretty(&AecCalibration::default())?);

    if let Some(path) = CalibrationFile::default_path() {
        println!();
        println!("Default calibration path: {}", path.display());
    }
    Ok(())
}

/// Print the flicker-avoidance profile of a sensor mode
pub fn print_profile(
    width: u16,
    height: u16,
    fps: u16,
    max_integration_time: f32,
    flicker: FlickerSelect,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = ResolutionParams { width, height, fps };
    let period = flicker.period();
    let profile = ecm_profile(params, max_integration_time, max_integration_time, period)?;

    println!("Mode:           {}", params);
    println!("Flicker:        {}", flicker.display_name());
    println!("Flicker period: {:.3} ms", period * 1000.0);
    println!("T0 factor:      {:.3}", profile.t0_factor);
    println!("T0:             {:.3} ms", profile.t0 * 1000.0);
    println!("A0:             {:.2}", profile.a0);
    Ok(())
}
