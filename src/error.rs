//! Error types for the line-following core.
//!
//! Sensor faults stop the robot before they surface; persistence failures carry
//! the in-memory calibration so the caller can decide whether to continue.

use std::io;

use thiserror::Error;

/// Failures reported by a reflectance source.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The device could not be read at all.
    #[error("reflectance read failed: {0}")]
    ReadFailed(String),

    /// The device returned a value outside its documented range.
    #[error("reflectance {reading} outside device range [{min}, {max}]")]
    OutOfRange {
        /// Raw value reported by the device.
        reading: i32,
        /// Lowest valid reading.
        min: i32,
        /// Highest valid reading.
        max: i32,
    },
}

/// Errors surfaced by calibration, configuration and the control loop.
#[derive(Debug, Error)]
pub enum LineFollowerError {
    #[error("sensor fault: {0}")]
    SensorFault(#[from] SensorError),

    /// Calibration produced a path value but it could not be written out.
    #[error("failed to persist calibrated path value {path_value}: {source}")]
    Persistence {
        path_value: i32,
        #[source]
        source: io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed document: {0}")]
    Format(#[from] serde_json::Error),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No persisted calibration exists and calibration was skipped.
    #[error("no calibration available; run calibration first")]
    NotCalibrated,
}

pub type Result<T> = std::result::Result<T, LineFollowerError>;
