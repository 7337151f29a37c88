//! controller.rs
//! Steering controller: proportional line following with a momentum bias.
//!
//! Given the classified path state it decides what the drive base should do
//! this cycle. On the path it steers proportionally to the reflectance error
//! (via the `pid` crate, P term only) plus the accumulated turn bias. On the
//! wall it stops and resets the bias. Off the path it hands over to the
//! autocorrection search.

use std::time::{Duration, Instant};

use log::{debug, info};
use pid::Pid;
use serde::{Deserialize, Serialize};

use crate::error::{LineFollowerError, Result};
use crate::sensing::{
    classifier::{PathState, Thresholds},
    sensor::{Reflectance, ReflectanceSource},
};
use crate::steering::{
    actuator::{DriveActuator, DriveCommand},
    autocorrect::{self, SearchOutcome},
    momentum::Momentum,
};

/// Sign of an in-place turn. Positive degrees are clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnDirection {
    Right,
    Left,
}

impl TurnDirection {
    #[inline]
    pub fn sign(&self) -> f64 {
        match self {
            TurnDirection::Right => 1.0,
            TurnDirection::Left => -1.0,
        }
    }

    #[inline]
    pub fn flipped(&self) -> Self {
        match self {
            TurnDirection::Right => TurnDirection::Left,
            TurnDirection::Left => TurnDirection::Right,
        }
    }
}

/// Which way the robot travels along the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelDirection {
    #[default]
    Forward,
    Reverse,
}

/// Static tuning, supplied at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Base swing of the autocorrection search, degrees. Must lie in (0, 90).
    pub turn_angle: f64,
    /// Forward speed while following, mm/s.
    pub drive_speed: f64,
    /// Turn rate per point of reflectance error, deg/s.
    pub proportional_gain: f64,
    /// When set, the proportional term is scaled by `drive_speed / reference_speed`.
    pub reference_speed: Option<f64>,
    /// Limit on the proportional term, deg/s.
    pub max_turn_rate: f64,
    /// Bias added per rapid autocorrection and removed per decay step, deg/s.
    pub cumulative_turn_size: f64,
    /// Clamp on the accumulated bias, deg/s.
    pub cumulative_turn_limit: f64,
    #[serde(with = "crate::utils::millis")]
    pub autocorrect_timeframe: Duration,
    #[serde(with = "crate::utils::millis")]
    pub decay_timeframe: Duration,
    /// Forward nudge after an exhausted search, mm. Zero disables it.
    pub nudge_distance: f64,
    pub travel: TravelDirection,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            turn_angle: 10.0,
            drive_speed: 100.0,
            proportional_gain: 1.6,
            reference_speed: None,
            max_turn_rate: 180.0,
            cumulative_turn_size: 10.0,
            cumulative_turn_limit: 30.0,
            autocorrect_timeframe: Duration::from_secs(1),
            decay_timeframe: Duration::from_millis(500),
            nudge_distance: 10.0,
            travel: TravelDirection::Forward,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(LineFollowerError::InvalidConfig(msg));

        if !(self.turn_angle > 0.0 && self.turn_angle < 90.0) {
            return invalid(format!("turn_angle must lie in (0, 90), got {}", self.turn_angle));
        }
        if self.drive_speed < 0.0 {
            return invalid(format!("drive_speed must not be negative, got {}", self.drive_speed));
        }
        if let Some(reference) = self.reference_speed {
            if reference <= 0.0 {
                return invalid(format!("reference_speed must be positive, got {reference}"));
            }
        }
        if self.max_turn_rate <= 0.0 {
            return invalid(format!("max_turn_rate must be positive, got {}", self.max_turn_rate));
        }
        if self.cumulative_turn_size < 0.0 || self.cumulative_turn_limit < 0.0 {
            return invalid("cumulative turn size and limit must not be negative".into());
        }
        if self.cumulative_turn_limit > 0.0 && self.cumulative_turn_size == 0.0 {
            return invalid("cumulative_turn_limit set but cumulative_turn_size is zero".into());
        }
        if self.nudge_distance < 0.0 {
            return invalid(format!("nudge_distance must not be negative, got {}", self.nudge_distance));
        }
        Ok(())
    }

    fn signed_speed(&self) -> f64 {
        match self.travel {
            TravelDirection::Forward => self.drive_speed,
            TravelDirection::Reverse => -self.drive_speed,
        }
    }

    fn speed_scale(&self) -> f64 {
        self.reference_speed
            .map(|reference| self.drive_speed / reference)
            .unwrap_or(1.0)
    }
}

/// Mutable per-run state. Owned by exactly one controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub last_turn_direction: TurnDirection,
    pub cumulative_turn: f64,
    pub last_autocorrect_time: Option<Instant>,
    pub last_decay_time: Instant,
}

impl ControllerState {
    pub fn new(now: Instant) -> Self {
        Self {
            last_turn_direction: TurnDirection::Right,
            cumulative_turn: 0.0,
            last_autocorrect_time: None,
            last_decay_time: now,
        }
    }
}

/// What the runner should do after one steering step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Steering {
    /// Apply this command and keep going.
    Drive(DriveCommand),
    /// End marker reached; the robot has to be stopped and the run ends.
    Wall,
    /// Off the path; run the autocorrection search.
    Search,
}

pub struct SteeringController {
    config: ControllerConfig,
    pid: Pid<f64>,
    momentum: Momentum,
    state: ControllerState,
}

impl SteeringController {
    pub fn new(config: ControllerConfig, now: Instant) -> Result<Self> {
        config.validate()?;

        let mut pid = Pid::new(0.0, config.max_turn_rate);
        pid.p(config.proportional_gain, config.max_turn_rate);

        let momentum = Momentum::new(
            config.cumulative_turn_size,
            config.cumulative_turn_limit,
            config.autocorrect_timeframe,
            config.decay_timeframe,
        );

        Ok(Self {
            config,
            pid,
            momentum,
            state: ControllerState::new(now),
        })
    }

    #[inline]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Fresh per-run state: no bias, no correction history, decay window starting at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.state = ControllerState::new(now);
        self.pid.reset_integral_term();
    }

    /// One steering decision. Does not touch the hardware.
    pub fn step(
        &mut self,
        path: PathState,
        reading: Reflectance,
        thresholds: &Thresholds,
        now: Instant,
    ) -> Steering {
        match path {
            PathState::OnPath => {
                self.momentum.decay(&mut self.state, now);
                let turn_rate = self.proportional(reading, thresholds) + self.state.cumulative_turn;
                Steering::Drive(DriveCommand::Drive {
                    speed: self.config.signed_speed(),
                    turn_rate,
                })
            }
            PathState::OnWall => {
                info!("[Steering] wall reached at reflectance {reading}");
                self.state.cumulative_turn = 0.0;
                self.state.last_turn_direction = TurnDirection::Right;
                Steering::Wall
            }
            PathState::OffPath => Steering::Search,
        }
    }

    /// Runs the bounded search, then records its direction and feeds the momentum model.
    pub fn autocorrect<S, A>(
        &mut self,
        sensor: &mut S,
        actuator: &mut A,
        thresholds: &Thresholds,
        now: Instant,
    ) -> Result<SearchOutcome>
    where
        S: ReflectanceSource + ?Sized,
        A: DriveActuator + ?Sized,
    {
        let outcome = autocorrect::search(
            sensor,
            actuator,
            thresholds,
            self.config.turn_angle,
            self.config.nudge_distance,
            self.state.last_turn_direction,
        )?;

        self.state.last_turn_direction = outcome.direction;
        self.momentum
            .register_correction(&mut self.state, outcome.direction, now);

        debug!(
            "[Steering] autocorrect found={} turns={} bias={:.1}",
            outcome.found, outcome.turns, self.state.cumulative_turn
        );
        Ok(outcome)
    }

    fn proportional(&mut self, reading: Reflectance, thresholds: &Thresholds) -> f64 {
        self.pid.setpoint(thresholds.path_value());
        let output = self.pid.next_control_output(f64::from(reading)).output;
        output * self.config.speed_scale()
    }
}
