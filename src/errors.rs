// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the exposure control engine

use std::fmt;

use crate::aec::AecState;

/// Result type alias using AecError
pub type AecResult<T> = Result<T, AecError>;

/// Result type for sensor collaborator calls
pub type SensorResult<T> = Result<T, SensorError>;

/// Main engine error type
#[derive(Debug, Clone, PartialEq)]
pub enum AecError {
    /// Operation is not valid in the current controller state
    WrongState {
        operation: &'static str,
        state: AecState,
    },
    /// Argument rejected before any state was touched
    InvalidArgument(String),
    /// Numeric domain violation (zero weight sum, negative exposure, unknown resolution)
    OutOfRange(String),
    /// Requested mode is not supported
    NotSupported(String),
    /// Controller is running or locked and cannot be released
    Busy,
    /// Sensor collaborator failure
    Sensor(SensorError),
    /// Calibration database failure
    Calibration(CalibrationError),
}

/// Errors reported by a sensor implementation
#[derive(Debug, Clone, PartialEq)]
pub enum SensorError {
    /// Query or control is not implemented by this sensor
    NotSupported(String),
    /// Sensor rejected a value
    InvalidValue(String),
    /// Sensor communication or driver failure
    Failure(String),
}

/// Errors reported by a calibration database
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Calibration source could not be read
    Io(String),
    /// Calibration data is malformed
    Parse(String),
    /// Calibration section is absent
    Missing(String),
}

impl fmt::Display for AecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AecError::WrongState { operation, state } => {
                write!(f, "{} not allowed in state {}", operation, state)
            }
            AecError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            AecError::OutOfRange(msg) => write!(f, "Out of range: {}", msg),
            AecError::NotSupported(msg) => write!(f, "Not supported: {}", msg),
            AecError::Busy => write!(f, "Exposure control is busy"),
            AecError::Sensor(e) => write!(f, "Sensor error: {}", e),
            AecError::Calibration(e) => write!(f, "Calibration error: {}", e),
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::NotSupported(msg) => write!(f, "Not supported: {}", msg),
            SensorError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            SensorError::Failure(msg) => write!(f, "Failure: {}", msg),
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::Io(msg) => write!(f, "I/O error: {}", msg),
            CalibrationError::Parse(msg) => write!(f, "Parse error: {}", msg),
            CalibrationError::Missing(msg) => write!(f, "Missing section: {}", msg),
        }
    }
}

impl std::error::Error for AecError {}
impl std::error::Error for SensorError {}
impl std::error::Error for CalibrationError {}

impl From<SensorError> for AecError {
    fn from(err: SensorError) -> Self {
        AecError::Sensor(err)
    }
}

impl From<CalibrationError> for AecError {
    fn from(err: CalibrationError) -> Self {
        AecError::Calibration(err)
    }
}

impl From<std::io::Error> for CalibrationError {
    fn from(err: std::io::Error) -> Self {
        CalibrationError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CalibrationError {
    fn from(err: serde_json::Error) -> Self {
        CalibrationError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_state_display() {
        let err = AecError::WrongState {
            operation: "configure",
            state: AecState::Running,
        };
        assert_eq!(err.to_string(), "configure not allowed in state Running");
    }

    #[test]
    fn test_sensor_error_conversion() {
        let err: AecError = SensorError::Failure("i2c timeout".into()).into();
        assert!(matches!(err, AecError::Sensor(SensorError::Failure(_))));
        assert!(err.to_string().contains("i2c timeout"));
    }
}
