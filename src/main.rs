//! # Line Follower Demo
//!
//! Drives the simulated robot along a printed line until it reaches the end
//! marker, then exports the recorded cycle events.
//!
//! ## Modes
//! - **Calibrate and run:** sample the line, persist the path value, follow.
//! - **Run with persisted calibration:** reuse the last `config.json`.
//!
//! ## Files
//! - `settings.json`: tuning; must at least choose the wall detection mode.
//! - `config.json`: calibration document `{"PATH_VALUE": .., "GREY_VALUE": ..}`.
//! - `data/logs/run_events.csv`: per-cycle event trace.

use std::io::{Write, stdin, stdout};

use line_follower::{
    FollowerSettings, JsonStore, LineFollower, LineFollowerError, Result, Startup, prepare_thresholds,
    sim::SimulatedRobot,
    utils::{export::export_events_csv, metrics::EventRecorder},
};
use log::{error, info, warn};

const SETTINGS_PATH: &str = "settings.json";

fn main() {
    env_logger::init();
    info!("=== LINE FOLLOWER START ===");

    let settings = match FollowerSettings::load(SETTINGS_PATH) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid settings in {}: {}", SETTINGS_PATH, e);
            return;
        }
    };

    loop {
        match prompt_menu().as_str() {
            "1" | "" => run_and_report(&settings, Startup::Calibrate),
            "2" => run_and_report(&settings, Startup::LoadPersisted),
            "3" => {
                println!("Exiting. Goodbye!");
                info!("=== LINE FOLLOWER FINISHED ===");
                return;
            }
            other => println!("Unrecognized option '{}', please try again.", other),
        }
    }
}

fn prompt_menu() -> String {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│     SELECT RUN MODE                         │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Calibrate, then follow the line         │");
    println!("│  2) Follow with persisted calibration       │");
    println!("│  3) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    print!("Select [1/2/3] (default: 1): ");
    let _ = stdout().flush();

    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}

fn run_and_report(settings: &FollowerSettings, startup: Startup) {
    match run_mission(settings, startup) {
        Ok(()) => println!("\n Run completed. Returning to menu...\n"),
        Err(LineFollowerError::Persistence { path_value, source }) => {
            // Refuse to follow on a calibration nobody can reload.
            error!(
                "Calibration measured path value {} but could not save it: {}",
                path_value, source
            );
        }
        Err(LineFollowerError::NotCalibrated) => {
            warn!("No persisted calibration at {:?}; choose option 1 first", settings.calibration.store_path);
        }
        Err(e) => error!("Run failed: {}", e),
    }
}

fn run_mission(settings: &FollowerSettings, startup: Startup) -> Result<()> {
    let robot = SimulatedRobot::new(settings.track.clone());
    let mut sensor = robot.sensor();
    let mut drive = robot.drive_base();
    let store = JsonStore::new(&settings.calibration.store_path);
    let mut calibrator = settings.calibrator()?;

    let thresholds = prepare_thresholds(startup, &mut calibrator, &mut sensor, &mut drive, &store)?;
    info!(
        "[Main] thresholds: path_value={} deviance={} wall={:?}",
        thresholds.path_value(),
        thresholds.accepted_deviance(),
        thresholds.wall_detection()
    );

    let recorder = EventRecorder::new();
    let mut follower = LineFollower::new(
        sensor,
        drive,
        thresholds,
        settings.controller.clone(),
        settings.runner.clone(),
    )?
    .with_recorder(recorder.clone());

    let reason = follower.run()?;
    let pose = robot.pose();
    info!(
        "[Main] {} after {} cycles ({:?} simulated), pose x={:.0} y={:.1} heading={:.1}",
        reason.name(),
        follower.cycles(),
        robot.elapsed(),
        pose.x,
        pose.y,
        pose.heading
    );

    if recorder.dropped() > 0 {
        warn!("[Main] {} cycle events dropped (queue full)", recorder.dropped());
    }
    export_events_csv(&settings.events_csv, &recorder.drain())?;
    Ok(())
}
