//! classifier.rs
//! Reflectance classification: on path, on wall (end marker) or off path.
//!
//! Classification is a pure function of one reading and the calibrated
//! thresholds. It is recomputed every cycle and never stored.
//!
//! Band edges:
//! - `BelowPathThreshold`: wall `r <= path - dev`, path `path - dev < r <= path + dev`.
//! - `DedicatedWallBand`: wall `wall - dev < r < wall + dev`, path `path - dev <= r <= path + dev`.
//! - `FixedCeiling`: wall `r < ceiling`, path `path - dev <= r <= path + dev`.
//!
//! Everything else is off path. Construction rejects thresholds whose wall
//! and path bands overlap, so the three states always partition the range,
//! and any value outside the device range.
//!
//! The dedicated band is open at both ends: with wall 8 and deviance 8 the
//! wall is 1..=15, and a reading of 0 is off path.

use serde::{Deserialize, Serialize};

use crate::error::{LineFollowerError, Result};
use crate::sensing::sensor::{REFLECTANCE_MAX, REFLECTANCE_MIN, Reflectance};

/// How the end-of-segment marker is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WallDetection {
    /// Anything darker than the path band is the wall.
    BelowPathThreshold,
    /// The wall has its own calibrated value, matched with the same deviance.
    DedicatedWallBand { wall_value: Reflectance },
    /// Anything strictly below a fixed reflectance is the wall.
    FixedCeiling { ceiling: Reflectance },
}

/// What the sensor is currently looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathState {
    OnPath,
    OnWall,
    OffPath,
}

impl PathState {
    pub fn name(&self) -> &'static str {
        match self {
            PathState::OnPath => "on_path",
            PathState::OnWall => "on_wall",
            PathState::OffPath => "off_path",
        }
    }
}

/// Calibrated decision thresholds, immutable for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    path_value: Reflectance,
    accepted_deviance: Reflectance,
    wall: WallDetection,
}

impl Thresholds {
    pub fn new(
        path_value: Reflectance,
        accepted_deviance: Reflectance,
        wall: WallDetection,
    ) -> Result<Self> {
        let in_range = |name: &str, value: Reflectance| {
            if (REFLECTANCE_MIN..=REFLECTANCE_MAX).contains(&value) {
                Ok(())
            } else {
                Err(LineFollowerError::InvalidConfig(format!(
                    "{name} {value} outside device range [{REFLECTANCE_MIN}, {REFLECTANCE_MAX}]"
                )))
            }
        };

        if accepted_deviance <= 0 || accepted_deviance > REFLECTANCE_MAX {
            return Err(LineFollowerError::InvalidConfig(format!(
                "accepted deviance must lie in (0, {REFLECTANCE_MAX}], got {accepted_deviance}"
            )));
        }
        in_range("path value", path_value)?;
        match wall {
            WallDetection::BelowPathThreshold => {}
            WallDetection::DedicatedWallBand { wall_value } => in_range("wall value", wall_value)?,
            WallDetection::FixedCeiling { ceiling } => in_range("wall ceiling", ceiling)?,
        }

        let path_floor = path_value - accepted_deviance;
        let path_ceiling = path_value + accepted_deviance;
        match wall {
            WallDetection::BelowPathThreshold => {}
            WallDetection::DedicatedWallBand { wall_value } => {
                // Open wall band must not reach into the closed path band.
                let wall_lo = wall_value - accepted_deviance;
                let wall_hi = wall_value + accepted_deviance;
                if wall_hi > path_floor && wall_lo < path_ceiling {
                    return Err(LineFollowerError::InvalidConfig(format!(
                        "wall band ({wall_lo}, {wall_hi}) overlaps path band [{path_floor}, {path_ceiling}]"
                    )));
                }
            }
            WallDetection::FixedCeiling { ceiling } => {
                if ceiling > path_floor {
                    return Err(LineFollowerError::InvalidConfig(format!(
                        "wall ceiling {ceiling} reaches into path band starting at {path_floor}"
                    )));
                }
            }
        }

        Ok(Self {
            path_value,
            accepted_deviance,
            wall,
        })
    }

    #[inline]
    pub fn path_value(&self) -> Reflectance {
        self.path_value
    }

    #[inline]
    pub fn accepted_deviance(&self) -> Reflectance {
        self.accepted_deviance
    }

    #[inline]
    pub fn wall_detection(&self) -> WallDetection {
        self.wall
    }

    /// Calibrated wall reflectance, when the wall has a band of its own.
    pub fn wall_value(&self) -> Option<Reflectance> {
        match self.wall {
            WallDetection::DedicatedWallBand { wall_value } => Some(wall_value),
            _ => None,
        }
    }

    /// Same bands, different path value. Used after re-calibration.
    pub fn with_path_value(&self, path_value: Reflectance) -> Result<Self> {
        Self::new(path_value, self.accepted_deviance, self.wall)
    }

    fn is_wall(&self, reading: Reflectance) -> bool {
        match self.wall {
            WallDetection::BelowPathThreshold => reading <= self.path_value - self.accepted_deviance,
            WallDetection::DedicatedWallBand { wall_value } => {
                wall_value - self.accepted_deviance < reading
                    && reading < wall_value + self.accepted_deviance
            }
            WallDetection::FixedCeiling { ceiling } => reading < ceiling,
        }
    }

    fn is_path(&self, reading: Reflectance) -> bool {
        let floor = self.path_value - self.accepted_deviance;
        let ceiling = self.path_value + self.accepted_deviance;
        match self.wall {
            // The lower edge already belongs to the wall in this mode.
            WallDetection::BelowPathThreshold => floor < reading && reading <= ceiling,
            _ => (floor..=ceiling).contains(&reading),
        }
    }
}

/// Classifies one reading. Pure; calling it twice gives the same answer.
pub fn classify(reading: Reflectance, thresholds: &Thresholds) -> PathState {
    if thresholds.is_wall(reading) {
        PathState::OnWall
    } else if thresholds.is_path(reading) {
        PathState::OnPath
    } else {
        PathState::OffPath
    }
}
