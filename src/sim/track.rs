//! track.rs
//! Simulated robot on a printed line, used by the demo binary and the
//! end-to-end tests.
//!
//! The line runs along +x and may sway sideways. The sensor sits `sensor_lead_mm`
//! ahead of the axle and follows the line's left edge: dark line to the left,
//! bright floor to the right, a linear blend across the edge. Past the end of
//! the line a dark end marker (the "wall") is printed.
//!
//! Time only advances when the sensor is polled: every read integrates the
//! current drive command over one `step`. Turns and straights are instant.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use rand::random_range;
use serde::{Deserialize, Serialize};

use crate::error::SensorError;
use crate::sensing::sensor::{REFLECTANCE_MAX, REFLECTANCE_MIN, Reflectance, ReflectanceSource};
use crate::steering::actuator::DriveActuator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub line_value: f64,
    pub floor_value: f64,
    pub wall_value: f64,
    /// Half the width of the edge blend, mm.
    pub edge_half_width_mm: f64,
    /// Line length before the end marker, mm.
    pub length_mm: f64,
    /// Sideways sway amplitude of the line, mm. Zero is a straight line.
    pub sway_mm: f64,
    /// Sway wavelength, mm.
    pub sway_wavelength_mm: f64,
    pub sensor_lead_mm: f64,
    /// Simulated time per sensor poll.
    #[serde(with = "crate::utils::millis")]
    pub step: Duration,
    /// Uniform reading noise amplitude. Zero disables noise.
    pub noise: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            line_value: 30.0,
            floor_value: 85.0,
            wall_value: 8.0,
            edge_half_width_mm: 12.0,
            length_mm: 1_500.0,
            sway_mm: 0.0,
            sway_wavelength_mm: 800.0,
            sensor_lead_mm: 60.0,
            step: Duration::from_millis(10),
            noise: 0.0,
        }
    }
}

/// Robot pose: axle centre in mm, heading in degrees counter-clockwise from +x.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

#[derive(Debug)]
struct World {
    config: TrackConfig,
    pose: Pose,
    speed: f64,
    turn_rate: f64,
    elapsed: Duration,
}

impl World {
    fn line_y(&self, x: f64) -> f64 {
        if self.config.sway_mm == 0.0 {
            return 0.0;
        }
        let phase = x / self.config.sway_wavelength_mm * std::f64::consts::TAU;
        self.config.sway_mm * phase.sin()
    }

    fn sensor_position(&self) -> (f64, f64) {
        let h = self.pose.heading.to_radians();
        (
            self.pose.x + self.config.sensor_lead_mm * h.cos(),
            self.pose.y + self.config.sensor_lead_mm * h.sin(),
        )
    }

    fn advance(&mut self) {
        let dt = self.config.step.as_secs_f64();
        // Positive turn rate is clockwise.
        self.pose.heading -= self.turn_rate * dt;
        let h = self.pose.heading.to_radians();
        self.pose.x += self.speed * dt * h.cos();
        self.pose.y += self.speed * dt * h.sin();
        self.elapsed += self.config.step;
    }

    fn reflectance(&self) -> f64 {
        let (sx, sy) = self.sensor_position();
        let c = &self.config;
        if sx >= c.length_mm {
            return c.wall_value;
        }
        let offset = sy - self.line_y(sx);
        let blend = ((offset + c.edge_half_width_mm) / (2.0 * c.edge_half_width_mm)).clamp(0.0, 1.0);
        c.floor_value + (c.line_value - c.floor_value) * blend
    }
}

/// Shared simulated world; hand out a sensor and a drive base that act on it.
#[derive(Debug, Clone)]
pub struct SimulatedRobot {
    world: Arc<Mutex<World>>,
}

impl SimulatedRobot {
    pub fn new(config: TrackConfig) -> Self {
        Self::with_pose(config, Pose::default())
    }

    pub fn with_pose(config: TrackConfig, pose: Pose) -> Self {
        Self {
            world: Arc::new(Mutex::new(World {
                config,
                pose,
                speed: 0.0,
                turn_rate: 0.0,
                elapsed: Duration::ZERO,
            })),
        }
    }

    pub fn sensor(&self) -> SimSensor {
        SimSensor {
            world: self.world.clone(),
        }
    }

    pub fn drive_base(&self) -> SimDrive {
        SimDrive {
            world: self.world.clone(),
        }
    }

    pub fn pose(&self) -> Pose {
        self.world.lock().pose
    }

    /// Simulated time elapsed so far.
    pub fn elapsed(&self) -> Duration {
        self.world.lock().elapsed
    }

    /// Sideways distance of the sensor from the line edge, mm.
    pub fn edge_offset(&self) -> f64 {
        let w = self.world.lock();
        let (sx, sy) = w.sensor_position();
        sy - w.line_y(sx)
    }
}

pub struct SimSensor {
    world: Arc<Mutex<World>>,
}

impl ReflectanceSource for SimSensor {
    fn reflection(&mut self) -> Result<Reflectance, SensorError> {
        let mut w = self.world.lock();
        w.advance();
        let mut value = w.reflectance();
        if w.config.noise > 0.0 {
            value += random_range(-w.config.noise..w.config.noise);
        }
        let value = value.round().clamp(f64::from(REFLECTANCE_MIN), f64::from(REFLECTANCE_MAX));
        Ok(value as Reflectance)
    }
}

pub struct SimDrive {
    world: Arc<Mutex<World>>,
}

impl DriveActuator for SimDrive {
    fn drive(&mut self, speed: f64, turn_rate: f64) {
        let mut w = self.world.lock();
        w.speed = speed;
        w.turn_rate = turn_rate;
    }

    fn turn(&mut self, degrees: f64) {
        let mut w = self.world.lock();
        w.pose.heading -= degrees;
    }

    fn straight(&mut self, distance: f64) {
        let mut w = self.world.lock();
        let h = w.pose.heading.to_radians();
        w.pose.x += distance * h.cos();
        w.pose.y += distance * h.sin();
    }

    fn stop(&mut self) {
        let mut w = self.world.lock();
        w.speed = 0.0;
        w.turn_rate = 0.0;
    }
}
