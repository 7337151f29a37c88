//! Stand-ins for the robot hardware.

mod scripted;
mod track;

pub use scripted::{Motion, RecordingDrive, ScriptedReflectance};
pub use track::{Pose, SimDrive, SimSensor, SimulatedRobot, TrackConfig};
