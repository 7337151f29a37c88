use std::time::Duration;

use line_follower::{
    CalibrationRecord, CalibrationSweep, Calibrator, ControllerConfig, JsonStore, LineFollower,
    LineFollowerError, MemoryStore, PathState, RunnerConfig, Startup, TerminationReason, Thresholds, WallDetection,
    prepare_thresholds,
    sim::{Motion, Pose, RecordingDrive, ScriptedReflectance, SimulatedRobot, TrackConfig},
    utils::metrics::{CycleEvent, EventRecorder},
};

fn fast() -> RunnerConfig {
    RunnerConfig {
        cycle_period: Duration::ZERO,
        max_duration: Some(Duration::from_secs(20)),
    }
}

fn calibrator() -> Calibrator {
    Calibrator::new(
        CalibrationSweep::default(),
        Duration::ZERO,
        8,
        WallDetection::DedicatedWallBand { wall_value: 8 },
    )
}

/// Calibrates on a straight stretch of the default track.
fn straight_line_thresholds() -> Thresholds {
    let robot = SimulatedRobot::new(TrackConfig::default());
    let store = MemoryStore::new();
    calibrator()
        .calibrate(&mut robot.sensor(), &mut robot.drive_base(), &store)
        .unwrap()
}

#[test]
fn readings_near_path_value_steer_proportionally() {
    let thresholds = Thresholds::new(40, 5, WallDetection::BelowPathThreshold).unwrap();
    let mut lf = LineFollower::new(
        ScriptedReflectance::new([40, 42, 38, 10]),
        RecordingDrive::default(),
        thresholds,
        ControllerConfig::default(),
        fast(),
    )
    .unwrap();

    assert_eq!(lf.run().unwrap(), TerminationReason::WallReached);
    let motions = lf.actuator_mut().motions().to_vec();
    let expected = [0.0, -3.2, 3.2];
    for (motion, rate) in motions.iter().zip(expected) {
        match motion {
            Motion::Drive { speed, turn_rate } => {
                assert_eq!(*speed, 100.0);
                assert!((turn_rate - rate).abs() < 1e-9, "{turn_rate} vs {rate}");
            }
            other => panic!("expected a drive command, got {other:?}"),
        }
    }
    assert_eq!(motions.last(), Some(&Motion::Stop));
}

#[test]
fn dark_readings_stop_on_the_first_cycle() {
    let thresholds = Thresholds::new(40, 5, WallDetection::BelowPathThreshold).unwrap();
    let mut lf = LineFollower::new(
        ScriptedReflectance::new([10, 10, 10]),
        RecordingDrive::default(),
        thresholds,
        ControllerConfig::default(),
        fast(),
    )
    .unwrap();

    assert_eq!(lf.run().unwrap(), TerminationReason::WallReached);
    assert_eq!(lf.cycles(), 1);
    assert_eq!(lf.actuator_mut().motions(), &[Motion::Stop]);
    assert_eq!(lf.controller_state().cumulative_turn, 0.0);
}

#[test]
fn calibrates_then_follows_straight_line_to_the_wall() {
    let robot = SimulatedRobot::new(TrackConfig::default());
    let mut sensor = robot.sensor();
    let mut drive = robot.drive_base();
    let store = MemoryStore::new();
    let mut cal = calibrator();

    let thresholds = prepare_thresholds(Startup::Calibrate, &mut cal, &mut sensor, &mut drive, &store).unwrap();
    // Edge midpoint of a 30/85 line.
    assert_eq!(thresholds.path_value(), 58);
    assert_eq!(store.stored().map(|r| r.path_value), Some(58));

    let recorder = EventRecorder::new();
    let mut lf = LineFollower::new(sensor, drive, thresholds, ControllerConfig::default(), fast())
        .unwrap()
        .with_recorder(recorder.clone());

    assert_eq!(lf.run().unwrap(), TerminationReason::WallReached);
    assert!(robot.pose().x > 1_400.0);
    assert!(robot.edge_offset().abs() < 4.0);

    let events = recorder.drain();
    assert_eq!(recorder.dropped(), 0);
    assert!(!events.iter().any(|e| matches!(e, CycleEvent::Autocorrect { .. })));
    assert!(matches!(
        events.last(),
        Some(CycleEvent::Terminated { reason: TerminationReason::WallReached, .. })
    ));
}

#[test]
fn heading_error_is_corrected_without_searching() {
    let thresholds = straight_line_thresholds();
    let robot = SimulatedRobot::with_pose(
        TrackConfig::default(),
        Pose { heading: 2.0, ..Pose::default() },
    );
    let recorder = EventRecorder::new();
    let mut lf = LineFollower::new(
        robot.sensor(),
        robot.drive_base(),
        thresholds,
        ControllerConfig::default(),
        fast(),
    )
    .unwrap()
    .with_recorder(recorder.clone());

    assert_eq!(lf.run().unwrap(), TerminationReason::WallReached);
    assert!(robot.pose().heading.abs() < 2.0);
    assert!(!recorder.drain().iter().any(|e| matches!(e, CycleEvent::Autocorrect { .. })));
}

#[test]
fn gentle_curve_is_followed() {
    let track = TrackConfig {
        sway_mm: 10.0,
        sway_wavelength_mm: 1_000.0,
        ..TrackConfig::default()
    };
    // Sensor on the edge at the start of the curve, axle aligned with its slope.
    let heading: f64 = 3.6;
    let pose = Pose {
        x: -60.0 * heading.to_radians().cos(),
        y: -60.0 * heading.to_radians().sin(),
        heading,
    };
    let robot = SimulatedRobot::with_pose(track, pose);
    let mut lf = LineFollower::new(
        robot.sensor(),
        robot.drive_base(),
        straight_line_thresholds(),
        ControllerConfig::default(),
        fast(),
    )
    .unwrap();

    assert_eq!(lf.run().unwrap(), TerminationReason::WallReached);
    assert!(robot.edge_offset().abs() < 4.0);
}

#[test]
fn search_reacquires_a_lost_line() {
    let thresholds = straight_line_thresholds();
    // Sensor 8 mm onto the bright floor: off the path from the first cycle.
    let robot = SimulatedRobot::with_pose(TrackConfig::default(), Pose { y: -8.0, ..Pose::default() });
    let config = ControllerConfig {
        turn_angle: 5.0,
        ..ControllerConfig::default()
    };
    let recorder = EventRecorder::new();
    let mut lf = LineFollower::new(robot.sensor(), robot.drive_base(), thresholds, config, fast())
        .unwrap()
        .with_recorder(recorder.clone());

    assert_eq!(lf.run().unwrap(), TerminationReason::WallReached);

    let searches: Vec<_> = recorder
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            CycleEvent::Autocorrect { found, turns, direction, .. } => Some((found, turns, direction)),
            _ => None,
        })
        .collect();
    // Right side first (wrong way, undone), then left finds the edge.
    assert_eq!(searches.len(), 1);
    let (found, turns, direction) = searches[0];
    assert!(found);
    assert_eq!(turns, 3);
    assert_eq!(direction, line_follower::TurnDirection::Left);
}

#[test]
fn exhausted_searches_nudge_forward_until_the_wall() {
    let track = TrackConfig {
        length_mm: 300.0,
        ..TrackConfig::default()
    };
    // Far out on the floor, out of reach of any swing.
    let robot = SimulatedRobot::with_pose(track, Pose { y: -100.0, ..Pose::default() });
    let recorder = EventRecorder::new();
    let mut lf = LineFollower::new(
        robot.sensor(),
        robot.drive_base(),
        straight_line_thresholds(),
        ControllerConfig::default(),
        fast(),
    )
    .unwrap()
    .with_recorder(recorder.clone());

    assert_eq!(lf.run().unwrap(), TerminationReason::WallReached);
    assert!(robot.pose().heading.abs() < 1e-6);

    let events = recorder.drain();
    let nudges = events
        .iter()
        .filter(|e| matches!(e, CycleEvent::Autocorrect { found: false, nudged: true, .. }))
        .count();
    // 60 mm sensor lead, 10 mm per nudge.
    assert_eq!(nudges, 24);
    assert!(!events.iter().any(|e| matches!(e, CycleEvent::Drive { .. })));
    // Momentum stays clamped no matter how many quick searches pile up.
    assert!(lf.controller_state().cumulative_turn.abs() <= 30.0);
}

#[test]
fn persisted_calibration_is_reused_by_later_runs() {
    let path = std::env::temp_dir().join(format!("line_follower_it_config_{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let store = JsonStore::new(&path);

    let robot = SimulatedRobot::new(TrackConfig::default());
    let mut first = calibrator();
    let calibrated = prepare_thresholds(
        Startup::Calibrate,
        &mut first,
        &mut robot.sensor(),
        &mut robot.drive_base(),
        &store,
    )
    .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, r#"{"PATH_VALUE":58}"#);

    // A fresh process: no sampling, no movement.
    let mut second = calibrator();
    let mut drive = RecordingDrive::default();
    let restored = prepare_thresholds(
        Startup::LoadPersisted,
        &mut second,
        &mut ScriptedReflectance::new([]),
        &mut drive,
        &store,
    )
    .unwrap();
    assert_eq!(restored, calibrated);
    assert_eq!(second.record(), Some(CalibrationRecord { path_value: 58, grey_value: None }));
    assert!(drive.motions().is_empty());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn unwritable_store_aborts_with_the_measured_value() {
    let mut sensor = ScriptedReflectance::new([40, 41, 41]);
    let mut drive = RecordingDrive::default();
    let mut cal = calibrator();

    let err = prepare_thresholds(Startup::Calibrate, &mut cal, &mut sensor, &mut drive, &MemoryStore::failing())
        .unwrap_err();
    assert!(matches!(err, LineFollowerError::Persistence { path_value: 41, .. }));
    assert!(!cal.is_calibrated());
}

#[test]
fn shutdown_handle_stops_a_long_run() {
    let thresholds = straight_line_thresholds();
    let mut lf = LineFollower::new(
        ScriptedReflectance::new([58]).hold_last(),
        RecordingDrive::default(),
        thresholds,
        ControllerConfig::default(),
        RunnerConfig {
            cycle_period: Duration::from_millis(1),
            max_duration: None,
        },
    )
    .unwrap();
    let handle = lf.shutdown_handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(25));
        handle.request();
    });

    assert_eq!(lf.run().unwrap(), TerminationReason::ExternalShutdown);
    stopper.join().unwrap();
    assert_eq!(lf.actuator_mut().last(), Some(Motion::Stop));
    assert!(lf.path_state().is_ok_and(|s| s == PathState::OnPath));
    assert!(matches!(
        lf.actuator_mut().motions().first(),
        Some(Motion::Drive { .. })
    ));
}
