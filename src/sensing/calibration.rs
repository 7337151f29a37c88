//! calibration.rs
//! Derives the path threshold from a few reflectance samples and persists it.
//!
//! The robot is moved between samples so the sensor sees several spots of
//! the line; the samples are averaged into `path_value` and written to a small
//! key–value document (`{"PATH_VALUE": 40, "GREY_VALUE": 38}`) that later
//! startups can load instead of recalibrating.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use average::Mean;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{LineFollowerError, Result};
use crate::sensing::{
    classifier::{Thresholds, WallDetection},
    sensor::{self, Reflectance, ReflectanceSource},
};
use crate::steering::actuator::DriveActuator;

/// Movement pattern used to collect calibration samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sweep", rename_all = "snake_case")]
pub enum CalibrationSweep {
    /// Sample, drive forward, sample, drive back, sample. Path value is the mean of three.
    Straight { forward_mm: f64, return_mm: f64 },
    /// Pivot left, sample, pivot right across the line, sample, re-centre.
    /// Path value is the mean of two; the first sample is kept as the grey value.
    Pivot { half_angle: f64 },
}

impl Default for CalibrationSweep {
    fn default() -> Self {
        CalibrationSweep::Straight {
            forward_mm: 100.0,
            return_mm: -80.0,
        }
    }
}

/// Persisted calibration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    #[serde(rename = "PATH_VALUE")]
    pub path_value: Reflectance,
    #[serde(rename = "GREY_VALUE", default, skip_serializing_if = "Option::is_none")]
    pub grey_value: Option<Reflectance>,
}

/// External storage for the calibration document.
pub trait CalibrationStore {
    /// Overwrites any previously stored record.
    fn save(&self, record: &CalibrationRecord) -> io::Result<()>;

    /// Returns `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<CalibrationRecord>>;
}

/// JSON file store, `config.json` by default.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationStore for JsonStore {
    fn save(&self, record: &CalibrationRecord) -> io::Result<()> {
        let json = serde_json::to_string(record).map_err(io::Error::other)?;
        fs::write(&self.path, json)
    }

    fn load(&self) -> Result<Option<CalibrationRecord>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store; can be told to fail writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<CalibrationRecord>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            record: Mutex::new(None),
            fail_writes: true,
        }
    }

    pub fn with_record(record: CalibrationRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            fail_writes: false,
        }
    }

    pub fn stored(&self) -> Option<CalibrationRecord> {
        *self.record.lock()
    }
}

impl CalibrationStore for MemoryStore {
    fn save(&self, record: &CalibrationRecord) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "store is read-only"));
        }
        *self.record.lock() = Some(*record);
        Ok(())
    }

    fn load(&self) -> Result<Option<CalibrationRecord>> {
        Ok(*self.record.lock())
    }
}

/// One-shot calibration. Once it has succeeded it never samples again in
/// this process; later calls return the cached thresholds.
#[derive(Debug, Clone)]
pub struct Calibrator {
    sweep: CalibrationSweep,
    settle: Duration,
    accepted_deviance: Reflectance,
    wall: WallDetection,
    calibrated: Option<(CalibrationRecord, Thresholds)>,
}

impl Calibrator {
    pub fn new(
        sweep: CalibrationSweep,
        settle: Duration,
        accepted_deviance: Reflectance,
        wall: WallDetection,
    ) -> Self {
        Self {
            sweep,
            settle,
            accepted_deviance,
            wall,
            calibrated: None,
        }
    }

    #[inline]
    pub fn is_calibrated(&self) -> bool {
        self.calibrated.is_some()
    }

    pub fn record(&self) -> Option<CalibrationRecord> {
        self.calibrated.map(|(record, _)| record)
    }

    /// Samples, derives `path_value`, persists it, and returns the thresholds.
    ///
    /// A store failure is returned as `Persistence` with the computed value
    /// attached; the calibrator is not marked done in that case.
    pub fn calibrate<S, A, P>(
        &mut self,
        sensor: &mut S,
        actuator: &mut A,
        store: &P,
    ) -> Result<Thresholds>
    where
        S: ReflectanceSource + ?Sized,
        A: DriveActuator + ?Sized,
        P: CalibrationStore + ?Sized,
    {
        if let Some((_, thresholds)) = self.calibrated {
            debug!("[Calibrator] already calibrated; reusing path value {}", thresholds.path_value());
            return Ok(thresholds);
        }

        let record = self.collect(sensor, actuator)?;
        let thresholds = Thresholds::new(record.path_value, self.accepted_deviance, self.wall)?;

        if let Err(source) = store.save(&record) {
            warn!("[Calibrator] could not persist path value {}: {}", record.path_value, source);
            return Err(LineFollowerError::Persistence {
                path_value: record.path_value,
                source,
            });
        }

        info!(
            "[Calibrator] path_value={} grey_value={:?}",
            record.path_value, record.grey_value
        );
        self.calibrated = Some((record, thresholds));
        Ok(thresholds)
    }

    /// Skips sampling and adopts the last persisted calibration.
    pub fn restore<P>(&mut self, store: &P) -> Result<Thresholds>
    where
        P: CalibrationStore + ?Sized,
    {
        let record = store.load()?.ok_or(LineFollowerError::NotCalibrated)?;
        let thresholds = Thresholds::new(record.path_value, self.accepted_deviance, self.wall)?;
        info!("[Calibrator] restored path_value={}", record.path_value);
        self.calibrated = Some((record, thresholds));
        Ok(thresholds)
    }

    fn collect<S, A>(&self, sensor: &mut S, actuator: &mut A) -> Result<CalibrationRecord>
    where
        S: ReflectanceSource + ?Sized,
        A: DriveActuator + ?Sized,
    {
        match self.sweep {
            CalibrationSweep::Straight {
                forward_mm,
                return_mm,
            } => {
                let s1 = sensor::sample(sensor)?;
                actuator.straight(forward_mm);
                self.settle();
                let s2 = sensor::sample(sensor)?;
                actuator.straight(return_mm);
                self.settle();
                let s3 = sensor::sample(sensor)?;
                debug!("[Calibrator] straight samples {s1} {s2} {s3}");

                Ok(CalibrationRecord {
                    path_value: rounded_mean(&[s1, s2, s3]),
                    grey_value: None,
                })
            }
            CalibrationSweep::Pivot { half_angle } => {
                actuator.turn(-half_angle);
                let s1 = sensor::sample(sensor)?;
                self.settle();
                actuator.turn(2.0 * half_angle);
                let s2 = sensor::sample(sensor)?;
                self.settle();
                actuator.turn(-half_angle);
                self.settle();
                debug!("[Calibrator] pivot samples {s1} {s2}");

                Ok(CalibrationRecord {
                    path_value: rounded_mean(&[s1, s2]),
                    grey_value: Some(s1),
                })
            }
        }
    }

    fn settle(&self) {
        if !self.settle.is_zero() {
            spin_sleep::sleep(self.settle);
        }
    }
}

/// Mean of the samples, rounded half away from zero.
pub fn rounded_mean(samples: &[Reflectance]) -> Reflectance {
    let mean: Mean = samples.iter().map(|&s| f64::from(s)).collect();
    mean.mean().round() as Reflectance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RecordingDrive, ScriptedReflectance, Motion};

    fn calibrator(sweep: CalibrationSweep) -> Calibrator {
        Calibrator::new(sweep, Duration::ZERO, 5, WallDetection::BelowPathThreshold)
    }

    #[test]
    fn straight_sweep_averages_three_samples() {
        let mut sensor = ScriptedReflectance::new([40, 43, 38]);
        let mut drive = RecordingDrive::default();
        let store = MemoryStore::new();

        let mut cal = calibrator(CalibrationSweep::default());
        let t = cal.calibrate(&mut sensor, &mut drive, &store).unwrap();

        // (40 + 43 + 38) / 3 = 40.33
        assert_eq!(t.path_value(), 40);
        assert_eq!(store.stored(), Some(CalibrationRecord { path_value: 40, grey_value: None }));
        assert_eq!(
            drive.motions(),
            &[Motion::Straight(100.0), Motion::Straight(-80.0)]
        );
        assert!(cal.is_calibrated());
    }

    #[test]
    fn mean_rounds_rather_than_truncates() {
        assert_eq!(rounded_mean(&[40, 41, 41]), 41);
        assert_eq!(rounded_mean(&[10, 10, 10]), 10);
        assert_eq!(rounded_mean(&[1, 2]), 2);
    }

    #[test]
    fn pivot_sweep_keeps_grey_value() {
        let mut sensor = ScriptedReflectance::new([30, 50]);
        let mut drive = RecordingDrive::default();
        let store = MemoryStore::new();

        let mut cal = calibrator(CalibrationSweep::Pivot { half_angle: 15.0 });
        let t = cal.calibrate(&mut sensor, &mut drive, &store).unwrap();

        assert_eq!(t.path_value(), 40);
        assert_eq!(cal.record().unwrap().grey_value, Some(30));
        assert_eq!(
            drive.motions(),
            &[Motion::Turn(-15.0), Motion::Turn(30.0), Motion::Turn(-15.0)]
        );
    }

    #[test]
    fn calibration_runs_only_once() {
        let mut sensor = ScriptedReflectance::new([40, 40, 40]);
        let mut drive = RecordingDrive::default();
        let store = MemoryStore::new();

        let mut cal = calibrator(CalibrationSweep::default());
        let first = cal.calibrate(&mut sensor, &mut drive, &store).unwrap();
        // Script is exhausted; a second sampling pass would fail.
        let second = cal.calibrate(&mut sensor, &mut drive, &store).unwrap();
        assert_eq!(first, second);
        assert_eq!(drive.motions().len(), 2);
    }

    #[test]
    fn persistence_failure_carries_path_value() {
        let mut sensor = ScriptedReflectance::new([40, 42, 44]);
        let mut drive = RecordingDrive::default();
        let store = MemoryStore::failing();

        let mut cal = calibrator(CalibrationSweep::default());
        let err = cal.calibrate(&mut sensor, &mut drive, &store).unwrap_err();
        assert!(matches!(err, LineFollowerError::Persistence { path_value: 42, .. }));
        assert!(!cal.is_calibrated());
    }

    #[test]
    fn sensor_fault_aborts_calibration() {
        let mut sensor = ScriptedReflectance::new([40, 250]);
        let mut drive = RecordingDrive::default();
        let store = MemoryStore::new();

        let mut cal = calibrator(CalibrationSweep::default());
        let err = cal.calibrate(&mut sensor, &mut drive, &store).unwrap_err();
        assert!(matches!(err, LineFollowerError::SensorFault(_)));
        assert_eq!(store.stored(), None);
    }

    #[test]
    fn json_document_uses_upper_case_keys() {
        let record = CalibrationRecord { path_value: 40, grey_value: Some(38) };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"PATH_VALUE":40,"GREY_VALUE":38}"#);

        let bare: CalibrationRecord = serde_json::from_str(r#"{"PATH_VALUE": 57}"#).unwrap();
        assert_eq!(bare, CalibrationRecord { path_value: 57, grey_value: None });
    }

    #[test]
    fn restore_rejects_corrupt_records() {
        for path_value in [500, -20, i32::MIN] {
            let store = MemoryStore::with_record(CalibrationRecord { path_value, grey_value: None });
            let mut cal = calibrator(CalibrationSweep::default());
            let err = cal.restore(&store).unwrap_err();
            assert!(matches!(err, LineFollowerError::InvalidConfig(_)), "path value {path_value}");
            assert!(!cal.is_calibrated());
        }
    }

    #[test]
    fn json_store_overwrites_and_reloads() {
        let path = std::env::temp_dir().join(format!("line_follower_cal_{}.json", std::process::id()));
        let store = JsonStore::new(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(store.load().unwrap(), None);

        store.save(&CalibrationRecord { path_value: 12, grey_value: None }).unwrap();
        store.save(&CalibrationRecord { path_value: 44, grey_value: Some(41) }).unwrap();
        assert_eq!(
            store.load().unwrap(),
            Some(CalibrationRecord { path_value: 44, grey_value: Some(41) })
        );
        let _ = fs::remove_file(&path);
    }
}
