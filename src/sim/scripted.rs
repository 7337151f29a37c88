//! scripted.rs
//! Deterministic stand-ins for the hardware: a sensor that replays a fixed
//! sequence of readings and a drive base that only records what it was told.

use std::collections::VecDeque;

use crate::error::SensorError;
use crate::sensing::sensor::{Reflectance, ReflectanceSource};
use crate::steering::actuator::DriveActuator;

/// Replays readings in order. Once the script runs out it either repeats the
/// last reading or reports a read failure.
#[derive(Debug, Clone)]
pub struct ScriptedReflectance {
    script: VecDeque<Reflectance>,
    hold_last: bool,
    last: Option<Reflectance>,
    reads: usize,
}

impl ScriptedReflectance {
    pub fn new(readings: impl IntoIterator<Item = Reflectance>) -> Self {
        Self {
            script: readings.into_iter().collect(),
            hold_last: false,
            last: None,
            reads: 0,
        }
    }

    /// Keep returning the final reading instead of failing.
    pub fn hold_last(mut self) -> Self {
        self.hold_last = true;
        self
    }

    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl ReflectanceSource for ScriptedReflectance {
    fn reflection(&mut self) -> Result<Reflectance, SensorError> {
        self.reads += 1;
        match self.script.pop_front() {
            Some(reading) => {
                self.last = Some(reading);
                Ok(reading)
            }
            None => match self.last {
                Some(reading) if self.hold_last => Ok(reading),
                _ => Err(SensorError::ReadFailed("script exhausted".into())),
            },
        }
    }
}

/// One recorded actuator call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    Drive { speed: f64, turn_rate: f64 },
    Turn(f64),
    Straight(f64),
    Stop,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingDrive {
    motions: Vec<Motion>,
}

impl RecordingDrive {
    pub fn motions(&self) -> &[Motion] {
        &self.motions
    }

    pub fn last(&self) -> Option<Motion> {
        self.motions.last().copied()
    }
}

impl DriveActuator for RecordingDrive {
    fn drive(&mut self, speed: f64, turn_rate: f64) {
        self.motions.push(Motion::Drive { speed, turn_rate });
    }

    fn turn(&mut self, degrees: f64) {
        self.motions.push(Motion::Turn(degrees));
    }

    fn straight(&mut self, distance: f64) {
        self.motions.push(Motion::Straight(distance));
    }

    fn stop(&mut self) {
        self.motions.push(Motion::Stop);
    }
}
