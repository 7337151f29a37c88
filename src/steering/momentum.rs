//! momentum.rs
//! Turn momentum: a steering bias baked in when autocorrections recur quickly,
//! decayed back toward zero while the robot drives straight.
//!
//! Accumulation is clamped to `±limit` and decay never crosses zero.

use std::time::{Duration, Instant};

use log::debug;

use crate::steering::controller::{ControllerState, TurnDirection};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Momentum {
    step: f64,
    limit: f64,
    autocorrect_window: Duration,
    decay_window: Duration,
}

impl Momentum {
    /// `step` and `limit` are expected non-negative; the controller config validates them.
    pub fn new(step: f64, limit: f64, autocorrect_window: Duration, decay_window: Duration) -> Self {
        Self {
            step: step.abs(),
            limit: limit.abs(),
            autocorrect_window,
            decay_window,
        }
    }

    #[inline]
    pub fn limit(&self) -> f64 {
        self.limit
    }

    /// Called when an autocorrection finishes. Returns true if the bias changed.
    ///
    /// A correction within `autocorrect_window` of the previous one adds one
    /// step in `direction`. Accumulating restarts the decay window.
    pub fn register_correction(
        &self,
        state: &mut ControllerState,
        direction: TurnDirection,
        now: Instant,
    ) -> bool {
        let previous = state.last_autocorrect_time.replace(now);

        let Some(previous) = previous else {
            return false;
        };
        if now.saturating_duration_since(previous) > self.autocorrect_window {
            return false;
        }

        let before = state.cumulative_turn;
        state.cumulative_turn =
            (before + direction.sign() * self.step).clamp(-self.limit, self.limit);
        state.last_decay_time = now;

        if state.cumulative_turn != before {
            debug!("[Momentum] cumulative turn {:.1} -> {:.1}", before, state.cumulative_turn);
            true
        } else {
            false
        }
    }

    /// Called on every straight-driving cycle. Returns true if the bias shrank.
    pub fn decay(&self, state: &mut ControllerState, now: Instant) -> bool {
        if state.cumulative_turn == 0.0 {
            return false;
        }
        if now.saturating_duration_since(state.last_decay_time) < self.decay_window {
            return false;
        }

        let before = state.cumulative_turn;
        state.cumulative_turn = if before > 0.0 {
            (before - self.step).max(0.0)
        } else {
            (before + self.step).min(0.0)
        };
        state.last_decay_time = now;
        debug!("[Momentum] decayed {:.1} -> {:.1}", before, state.cumulative_turn);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn model() -> Momentum {
        Momentum::new(10.0, 30.0, 1_000 * MS, 500 * MS)
    }

    #[test]
    fn first_correction_only_starts_the_window() {
        let t0 = Instant::now();
        let mut state = ControllerState::new(t0);
        assert!(!model().register_correction(&mut state, TurnDirection::Right, t0));
        assert_eq!(state.cumulative_turn, 0.0);
        assert_eq!(state.last_autocorrect_time, Some(t0));
    }

    #[test]
    fn quick_repeats_accumulate_in_direction() {
        let t0 = Instant::now();
        let m = model();
        let mut state = ControllerState::new(t0);
        m.register_correction(&mut state, TurnDirection::Left, t0);
        assert!(m.register_correction(&mut state, TurnDirection::Left, t0 + 200 * MS));
        assert_eq!(state.cumulative_turn, -10.0);
        assert!(m.register_correction(&mut state, TurnDirection::Right, t0 + 400 * MS));
        assert_eq!(state.cumulative_turn, 0.0);
    }

    #[test]
    fn slow_repeats_do_not_accumulate() {
        let t0 = Instant::now();
        let m = model();
        let mut state = ControllerState::new(t0);
        m.register_correction(&mut state, TurnDirection::Right, t0);
        assert!(!m.register_correction(&mut state, TurnDirection::Right, t0 + 1_500 * MS));
        assert_eq!(state.cumulative_turn, 0.0);
    }

    #[test]
    fn accumulation_is_clamped() {
        let t0 = Instant::now();
        let m = model();
        let mut state = ControllerState::new(t0);
        for i in 0..50u32 {
            m.register_correction(&mut state, TurnDirection::Right, t0 + i * 10 * MS);
            assert!(state.cumulative_turn <= m.limit());
        }
        assert_eq!(state.cumulative_turn, 30.0);
    }

    #[test]
    fn decay_waits_for_its_window() {
        let t0 = Instant::now();
        let m = model();
        let mut state = ControllerState::new(t0);
        state.cumulative_turn = 20.0;
        assert!(!m.decay(&mut state, t0 + 100 * MS));
        assert!(m.decay(&mut state, t0 + 500 * MS));
        assert_eq!(state.cumulative_turn, 10.0);
        assert!(!m.decay(&mut state, t0 + 700 * MS));
    }

    #[test]
    fn decay_shrinks_monotonically_to_exactly_zero() {
        let t0 = Instant::now();
        let m = model();
        let mut state = ControllerState::new(t0);
        state.cumulative_turn = -25.0;

        let mut now = t0;
        let mut last = state.cumulative_turn.abs();
        while state.cumulative_turn != 0.0 {
            now += 600 * MS;
            assert!(m.decay(&mut state, now));
            assert!(state.cumulative_turn.abs() < last);
            assert!(state.cumulative_turn <= 0.0);
            last = state.cumulative_turn.abs();
        }

        for _ in 0..5 {
            now += 600 * MS;
            assert!(!m.decay(&mut state, now));
            assert_eq!(state.cumulative_turn, 0.0);
        }
    }
}
