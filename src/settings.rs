//! settings.rs
//! Tuning for a whole run, loaded from a JSON document.
//!
//! Every field but the wall detection mode has a default. The mode must be
//! chosen explicitly; loading fails without it.
//! ```json
//! { "accepted_deviance": 6, "wall": { "mode": "below_path_threshold" },
//!   "controller": { "turn_angle": 15, "drive_speed": 80 } }
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{LineFollowerError, Result};
use crate::runner::RunnerConfig;
use crate::sensing::{
    calibration::{CalibrationSweep, Calibrator},
    classifier::WallDetection,
    sensor::Reflectance,
};
use crate::sim::TrackConfig;
use crate::steering::controller::ControllerConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub sweep: CalibrationSweep,
    /// Pause after each calibration movement.
    #[serde(with = "crate::utils::millis")]
    pub settle: Duration,
    /// Where the calibration document is persisted.
    pub store_path: PathBuf,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            sweep: CalibrationSweep::default(),
            settle: Duration::from_millis(100),
            store_path: PathBuf::from("config.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerSettings {
    pub accepted_deviance: Reflectance,
    /// How the end marker is recognised. No default.
    pub wall: Option<WallDetection>,
    pub controller: ControllerConfig,
    pub runner: RunnerConfig,
    pub calibration: CalibrationSettings,
    /// Simulated course used by the demo binary.
    pub track: TrackConfig,
    pub events_csv: PathBuf,
}

impl Default for FollowerSettings {
    fn default() -> Self {
        Self {
            accepted_deviance: 8,
            wall: None,
            controller: ControllerConfig::default(),
            runner: RunnerConfig::default(),
            calibration: CalibrationSettings::default(),
            track: TrackConfig::default(),
            events_csv: PathBuf::from("data/logs/run_events.csv"),
        }
    }
}

impl FollowerSettings {
    /// Reads `path`, falling back to defaults when the file does not exist.
    /// Either way the result must name a wall detection mode.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = match fs::read_to_string(path) {
            Ok(text) => {
                info!("Loaded settings from {:?}", path);
                serde_json::from_str(&text)?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No settings at {:?}; using defaults", path);
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.accepted_deviance <= 0 {
            return Err(LineFollowerError::InvalidConfig(format!(
                "accepted_deviance must be positive, got {}",
                self.accepted_deviance
            )));
        }
        self.wall_detection()?;
        if self.track.step.is_zero() {
            return Err(LineFollowerError::InvalidConfig("track step must be non-zero".into()));
        }
        self.controller.validate()
    }

    pub fn wall_detection(&self) -> Result<WallDetection> {
        self.wall.ok_or_else(|| {
            LineFollowerError::InvalidConfig(
                "no wall detection mode configured; set \"wall\" to below_path_threshold, dedicated_wall_band or fixed_ceiling".into(),
            )
        })
    }

    pub fn calibrator(&self) -> Result<Calibrator> {
        Ok(Calibrator::new(
            self.calibration.sweep,
            self.calibration.settle,
            self.accepted_deviance,
            self.wall_detection()?,
        ))
    }
}
