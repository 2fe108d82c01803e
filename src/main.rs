// SPDX-License-Identifier: GPL-3.0-only

use camera_aec::FlickerSelect;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "aec-sim")]
#[command(about = "Closed-loop simulator for the camera auto exposure controller")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file against a simulated sensor
    Run {
        /// Scenario JSON (sensor model, scene, controller config)
        scenario: PathBuf,

        /// Override the number of frames in the scenario
        #[arg(short, long)]
        frames: Option<u32>,

        /// Print one JSON object per frame instead of a table
        #[arg(long)]
        json: bool,

        /// Calibration file (default: ~/.config/camera-aec/calibration.json if present)
        #[arg(short, long)]
        calibration: Option<PathBuf>,
    },

    /// Print the default controller configuration and calibration
    Defaults,

    /// Show the flicker-avoidance profile for a sensor mode
    Profile {
        #[arg(long)]
        width: u16,

        #[arg(long)]
        height: u16,

        #[arg(long)]
        fps: u16,

        /// Longest integration time of the mode in seconds
        #[arg(long, default_value = "0.033")]
        max_integration_time: f32,

        /// Mains flicker frequency
        #[arg(long, value_enum, default_value = "hz100")]
        flicker: FlickerArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FlickerArg {
    Off,
    Hz100,
    Hz120,
}

impl From<FlickerArg> for FlickerSelect {
    fn from(arg: FlickerArg) -> Self {
        match arg {
            FlickerArg::Off => FlickerSelect::Off,
            FlickerArg::Hz100 => FlickerSelect::Hz100,
            FlickerArg::Hz120 => FlickerSelect::Hz120,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_aec=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            frames,
            json,
            calibration,
        } => cli::run_scenario(&scenario, frames, json, calibration),
        Commands::Defaults => cli::print_defaults(),
        Commands::Profile {
            width,
            height,
            fps,
            max_integration_time,
            flicker,
        } => cli::print_profile(width, height, fps, max_integration_time, flicker.into()),
    }
}
