//! runner.rs
//! The line-following control loop.
//!
//! Each cycle: check for shutdown and timeout, sample the sensor, classify,
//! then either drive, stop at the wall, or run the autocorrection search.
//! Cycles are released on a fixed period with a spin sleeper; a zero period
//! runs back-to-back.
//!
//! The loop is single-threaded. The only thing shared with the outside is the
//! shutdown flag, polled once per cycle.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::error::{LineFollowerError, Result};
use crate::sensing::{
    calibration::{CalibrationStore, Calibrator},
    classifier::{PathState, Thresholds, classify},
    sensor::{self, Reflectance, ReflectanceSource},
};
use crate::steering::{
    actuator::{DriveActuator, DriveCommand},
    controller::{ControllerConfig, ControllerState, Steering, SteeringController},
};
use crate::utils::metrics::{CycleEvent, EventRecorder};

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    WallReached,
    TimedOut,
    ExternalShutdown,
}

impl TerminationReason {
    pub fn name(&self) -> &'static str {
        match self {
            TerminationReason::WallReached => "wall_reached",
            TerminationReason::TimedOut => "timed_out",
            TerminationReason::ExternalShutdown => "external_shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    #[serde(with = "crate::utils::millis")]
    pub cycle_period: Duration,
    /// Soft timeout, independent of the sensor.
    #[serde(with = "crate::utils::millis::option")]
    pub max_duration: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cycle_period: Duration::from_millis(10),
            max_duration: None,
        }
    }
}

/// Cooperative cancellation flag. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Where the thresholds for a run come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Sample the line now and persist the result.
    Calibrate,
    /// Reuse the last persisted calibration.
    LoadPersisted,
}

/// Produces the thresholds for the control loop. Calibration always finishes
/// (or fails) before the loop starts; nothing runs on unknown thresholds.
pub fn prepare_thresholds<S, A, P>(
    startup: Startup,
    calibrator: &mut Calibrator,
    sensor: &mut S,
    actuator: &mut A,
    store: &P,
) -> Result<Thresholds>
where
    S: ReflectanceSource + ?Sized,
    A: DriveActuator + ?Sized,
    P: CalibrationStore + ?Sized,
{
    match startup {
        Startup::Calibrate => calibrator.calibrate(sensor, actuator, store),
        Startup::LoadPersisted => calibrator.restore(store),
    }
}

pub struct LineFollower<S, A> {
    sensor: S,
    actuator: A,
    thresholds: Thresholds,
    steering: SteeringController,
    config: RunnerConfig,
    shutdown: ShutdownHandle,
    recorder: Option<EventRecorder>,
    cycle: u64,
}

impl<S: ReflectanceSource, A: DriveActuator> LineFollower<S, A> {
    pub fn new(
        sensor: S,
        actuator: A,
        thresholds: Thresholds,
        controller: ControllerConfig,
        config: RunnerConfig,
    ) -> Result<Self> {
        Ok(Self {
            sensor,
            actuator,
            thresholds,
            steering: SteeringController::new(controller, Instant::now())?,
            config,
            shutdown: ShutdownHandle::default(),
            recorder: None,
            cycle: 0,
        })
    }

    pub fn with_recorder(mut self, recorder: EventRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    #[inline]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Explicit re-calibration between runs.
    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        info!("[Runner] thresholds updated: path_value={}", thresholds.path_value());
        self.thresholds = thresholds;
    }

    pub fn controller_state(&self) -> &ControllerState {
        self.steering.state()
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Hardware access for mission scripts that manoeuvre between runs.
    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn into_parts(self) -> (S, A) {
        (self.sensor, self.actuator)
    }

    /// Samples the sensor once and classifies it.
    pub fn path_state(&mut self) -> Result<PathState> {
        let reading = sensor::sample(&mut self.sensor)?;
        Ok(classify(reading, &self.thresholds))
    }

    pub fn is_on_path(&mut self) -> Result<bool> {
        Ok(self.path_state()? == PathState::OnPath)
    }

    pub fn is_on_wall(&mut self) -> Result<bool> {
        Ok(self.path_state()? == PathState::OnWall)
    }

    pub fn is_off_path(&mut self) -> Result<bool> {
        Ok(self.path_state()? == PathState::OffPath)
    }

    /// Follows the line until the wall, the timeout, or a shutdown request.
    ///
    /// Every call starts from a fresh controller state and cycle count.
    ///
    /// A sensor fault stops the robot and is returned as an error.
    pub fn run(&mut self) -> Result<TerminationReason> {
        let start = Instant::now();
        // Controller state never carries over from a previous run.
        self.steering.reset(start);
        self.cycle = 0;
        let period = self.config.cycle_period;
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut next_release = start + period;

        info!(
            "[Runner] start path_value={} deviance={} period={:?}",
            self.thresholds.path_value(),
            self.thresholds.accepted_deviance(),
            period
        );

        loop {
            if self.shutdown.is_requested() {
                return Ok(self.terminate(TerminationReason::ExternalShutdown));
            }
            if let Some(max) = self.config.max_duration {
                if start.elapsed() >= max {
                    warn!("[Runner] no wall after {:?}; timing out", max);
                    return Ok(self.terminate(TerminationReason::TimedOut));
                }
            }

            self.cycle += 1;
            let reading = match sensor::sample(&mut self.sensor) {
                Ok(reading) => reading,
                Err(e) => return Err(self.fault(e.into())),
            };
            let state = classify(reading, &self.thresholds);
            self.record_classified(reading, state);

            let now = Instant::now();
            match self.steering.step(state, reading, &self.thresholds, now) {
                Steering::Drive(command) => {
                    self.actuator.apply(command);
                    self.record_drive(command);
                }
                Steering::Wall => {
                    return Ok(self.terminate(TerminationReason::WallReached));
                }
                Steering::Search => {
                    let outcome = match self.steering.autocorrect(
                        &mut self.sensor,
                        &mut self.actuator,
                        &self.thresholds,
                        now,
                    ) {
                        Ok(outcome) => outcome,
                        Err(e) => return Err(self.fault(e)),
                    };
                    if let Some(recorder) = &self.recorder {
                        recorder.record(CycleEvent::Autocorrect {
                            cycle: self.cycle,
                            ts_ns: recorder.now_ns(),
                            found: outcome.found,
                            turns: outcome.turns,
                            direction: outcome.direction,
                            nudged: outcome.nudged,
                            bias: self.steering.state().cumulative_turn,
                        });
                    }
                }
            }

            if !period.is_zero() {
                let now = Instant::now();
                if now < next_release {
                    sleeper.sleep(next_release - now);
                } else {
                    debug!("[Runner] cycle {} overran its period", self.cycle);
                }
                next_release += period;
            }
        }
    }

    fn terminate(&mut self, reason: TerminationReason) -> TerminationReason {
        self.actuator.apply(DriveCommand::Stop);
        info!("[Runner] {} after {} cycles", reason.name(), self.cycle);
        if let Some(recorder) = &self.recorder {
            recorder.record(CycleEvent::Terminated {
                cycle: self.cycle,
                ts_ns: recorder.now_ns(),
                reason,
            });
        }
        reason
    }

    fn fault(&mut self, err: LineFollowerError) -> LineFollowerError {
        self.actuator.stop();
        error!("[Runner] stopping on cycle {}: {}", self.cycle, err);
        err
    }

    fn record_classified(&self, reading: Reflectance, state: PathState) {
        if let Some(recorder) = &self.recorder {
            recorder.record(CycleEvent::Classified {
                cycle: self.cycle,
                ts_ns: recorder.now_ns(),
                reading,
                state,
            });
        }
    }

    fn record_drive(&self, command: DriveCommand) {
        if let (Some(recorder), DriveCommand::Drive { speed, turn_rate }) = (&self.recorder, command) {
            recorder.record(CycleEvent::Drive {
                cycle: self.cycle,
                ts_ns: recorder.now_ns(),
                speed,
                turn_rate,
                bias: self.steering.state().cumulative_turn,
            });
        }
    }
}
