//! # Line follower
//!
//! Control core for a wheeled robot following a printed line with a single
//! reflectance sensor.
//!
//! - **Sensing:** classify each reading as on path, on wall (end marker) or off path;
//!   calibrate the path value from a few samples and persist it.
//! - **Steering:** proportional control on the path, a bounded oscillating search
//!   when off it, and a decaying turn bias when corrections keep recurring.
//! - **Runner:** the fixed-cadence loop that ties them together until the wall,
//!   a timeout or a shutdown request.
//!
//! Hardware is injected through `ReflectanceSource` and `DriveActuator`.

pub mod error;
pub mod runner;
pub mod sensing;
pub mod settings;
pub mod sim;
pub mod steering;
pub mod utils;

pub use error::{LineFollowerError, Result, SensorError};
pub use runner::{LineFollower, RunnerConfig, ShutdownHandle, Startup, TerminationReason, prepare_thresholds};
pub use sensing::{
    calibration::{CalibrationRecord, CalibrationStore, CalibrationSweep, Calibrator, JsonStore, MemoryStore},
    classifier::{PathState, Thresholds, WallDetection, classify},
    sensor::{Reflectance, ReflectanceSource},
};
pub use settings::FollowerSettings;
pub use steering::{
    actuator::{DriveActuator, DriveCommand},
    controller::{ControllerConfig, ControllerState, SteeringController, TravelDirection, TurnDirection},
};
