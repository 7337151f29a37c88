//! autocorrect.rs
//! Bounded oscillating search for the path edge.
//!
//! Starting from the side we last drifted to, swing out by `turn_angle`,
//! check, swing back, try the other side, then widen the swing. The loop
//! stops as soon as the sensor leaves the off-path state or the swing would
//! reach 90°, so it always terminates for any `turn_angle` in (0, 90).

use log::{debug, warn};

use crate::error::Result;
use crate::sensing::{
    classifier::{PathState, Thresholds, classify},
    sensor::{self, ReflectanceSource},
};
use crate::steering::{actuator::DriveActuator, controller::TurnDirection};

/// Hard ceiling on a single swing, degrees.
pub const MAX_SWING_DEGREES: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOutcome {
    /// Path reacquired.
    pub found: bool,
    /// Number of `turn` commands issued, undo turns included.
    pub turns: u32,
    /// Distinct swing widths tried.
    pub swing_levels: u32,
    /// Direction to remember for the next search.
    pub direction: TurnDirection,
    /// Fallback forward nudge issued after exhausting the bound.
    pub nudged: bool,
}

/// Upper bound on the swing widths a search with `turn_angle` can try.
pub fn max_swing_levels(turn_angle: f64) -> u32 {
    (MAX_SWING_DEGREES / turn_angle).ceil() as u32
}

pub fn search<S, A>(
    sensor: &mut S,
    actuator: &mut A,
    thresholds: &Thresholds,
    turn_angle: f64,
    nudge_distance: f64,
    start: TurnDirection,
) -> Result<SearchOutcome>
where
    S: ReflectanceSource + ?Sized,
    A: DriveActuator + ?Sized,
{
    actuator.stop();

    let mut swing: u32 = 1;
    let mut direction = start;
    let mut turns = 0;
    let mut swing_levels = 0;
    let mut found = false;
    let mut state = classify(sensor::sample(sensor)?, thresholds);

    while state == PathState::OffPath && f64::from(swing) * turn_angle < MAX_SWING_DEGREES {
        swing_levels = swing_levels.max(swing);
        let angle = turn_angle * f64::from(swing) * direction.sign();

        actuator.turn(angle);
        turns += 1;
        if classify(sensor::sample(sensor)?, thresholds) == PathState::OnPath {
            found = true;
            break;
        }

        actuator.turn(-angle);
        turns += 1;

        // Both sides tried at this width.
        if direction != start {
            swing += 1;
        }
        direction = direction.flipped();
        state = classify(sensor::sample(sensor)?, thresholds);
    }

    let exhausted = !found && state == PathState::OffPath;
    let nudged = exhausted && nudge_distance > 0.0;
    if exhausted {
        warn!("[Autocorrect] path not found within {MAX_SWING_DEGREES}° after {turns} turns");
        if nudged {
            actuator.straight(nudge_distance);
        }
    } else {
        debug!("[Autocorrect] settled {:?} after {turns} turns", state);
    }

    Ok(SearchOutcome {
        found,
        turns,
        swing_levels,
        direction,
        nudged,
    })
}
