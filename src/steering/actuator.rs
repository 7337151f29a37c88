//! actuator.rs
//! Drive output capability.
//!
//! `drive` is continuous and returns immediately; `turn` and `straight` block
//! until the motion completes; `stop` is immediate.

use serde::Serialize;

/// Output of one steering step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DriveCommand {
    /// Continuous drive: forward speed (mm/s) and turn rate (deg/s, positive is clockwise).
    Drive { speed: f64, turn_rate: f64 },
    Stop,
}

/// A differential drive base.
pub trait DriveActuator {
    fn drive(&mut self, speed: f64, turn_rate: f64);

    /// Turns in place by `degrees` (positive is clockwise). Blocks until done.
    fn turn(&mut self, degrees: f64);

    /// Drives `distance` millimetres along the current heading. Blocks until done.
    fn straight(&mut self, distance: f64);

    fn stop(&mut self);

    fn apply(&mut self, command: DriveCommand) {
        match command {
            DriveCommand::Drive { speed, turn_rate } => self.drive(speed, turn_rate),
            DriveCommand::Stop => self.stop(),
        }
    }
}

impl<A: DriveActuator + ?Sized> DriveActuator for &mut A {
    fn drive(&mut self, speed: f64, turn_rate: f64) {
        (**self).drive(speed, turn_rate)
    }

    fn turn(&mut self, degrees: f64) {
        (**self).turn(degrees)
    }

    fn straight(&mut self, distance: f64) {
        (**self).straight(distance)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

impl<A: DriveActuator + ?Sized> DriveActuator for Box<A> {
    fn drive(&mut self, speed: f64, turn_rate: f64) {
        (**self).drive(speed, turn_rate)
    }

    fn turn(&mut self, degrees: f64) {
        (**self).turn(degrees)
    }

    fn straight(&mut self, distance: f64) {
        (**self).straight(distance)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}
