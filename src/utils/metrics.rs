//! Cycle event recording for the control loop.
//!
//! `EventRecorder::record` pushes into a bounded lock-free queue and returns
//! immediately; a full queue drops the event and bumps a counter instead of
//! stalling the loop. Events are drained after the run and exported to CSV.
//!
//! Trace per cycle: classification → drive command or autocorrection → termination.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use crossbeam_queue::ArrayQueue;
use serde::Serialize;

use crate::runner::TerminationReason;
use crate::sensing::{classifier::PathState, sensor::Reflectance};
use crate::steering::controller::TurnDirection;

#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    /// Reading sampled and classified.
    Classified {
        cycle: u64,
        ts_ns: u64,
        reading: Reflectance,
        state: PathState,
    },
    /// Continuous drive command issued; `bias` is the momentum share of `turn_rate`.
    Drive {
        cycle: u64,
        ts_ns: u64,
        speed: f64,
        turn_rate: f64,
        bias: f64,
    },
    /// Autocorrection search finished.
    Autocorrect {
        cycle: u64,
        ts_ns: u64,
        found: bool,
        turns: u32,
        direction: TurnDirection,
        nudged: bool,
        bias: f64,
    },
    Terminated {
        cycle: u64,
        ts_ns: u64,
        reason: TerminationReason,
    },
}

/// Flat CSV row: cycle,ts_ns,event,reading,state,speed,turn_rate,bias,detail
#[derive(Debug, Clone, Serialize)]
pub struct EventRow {
    pub cycle: u64,
    pub ts_ns: u64,
    pub event: &'static str,
    pub reading: Option<Reflectance>,
    pub state: Option<&'static str>,
    pub speed: Option<f64>,
    pub turn_rate: Option<f64>,
    pub bias: Option<f64>,
    pub detail: Option<String>,
}

impl CycleEvent {
    pub fn cycle(&self) -> u64 {
        match self {
            CycleEvent::Classified { cycle, .. }
            | CycleEvent::Drive { cycle, .. }
            | CycleEvent::Autocorrect { cycle, .. }
            | CycleEvent::Terminated { cycle, .. } => *cycle,
        }
    }

    pub fn to_row(&self) -> EventRow {
        let blank = |cycle: u64, ts_ns: u64, event: &'static str| EventRow {
            cycle,
            ts_ns,
            event,
            reading: None,
            state: None,
            speed: None,
            turn_rate: None,
            bias: None,
            detail: None,
        };

        match self {
            CycleEvent::Classified { cycle, ts_ns, reading, state } => EventRow {
                reading: Some(*reading),
                state: Some(state.name()),
                ..blank(*cycle, *ts_ns, "classified")
            },
            CycleEvent::Drive { cycle, ts_ns, speed, turn_rate, bias } => EventRow {
                speed: Some(*speed),
                turn_rate: Some(*turn_rate),
                bias: Some(*bias),
                ..blank(*cycle, *ts_ns, "drive")
            },
            CycleEvent::Autocorrect { cycle, ts_ns, found, turns, direction, nudged, bias } => EventRow {
                bias: Some(*bias),
                detail: Some(format!(
                    "found={found} turns={turns} direction={direction:?} nudged={nudged}"
                )),
                ..blank(*cycle, *ts_ns, "autocorrect")
            },
            CycleEvent::Terminated { cycle, ts_ns, reason } => EventRow {
                detail: Some(reason.name().to_string()),
                ..blank(*cycle, *ts_ns, "terminated")
            },
        }
    }
}

const EVENT_QUEUE_CAPACITY: usize = 16_384;

/// Non-blocking event recorder. Clones share the same queue.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    queue: Arc<ArrayQueue<CycleEvent>>,
    dropped: Arc<AtomicU64>,
    run_start: Instant,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
            dropped: Arc::new(AtomicU64::new(0)),
            run_start: Instant::now(),
        }
    }

    #[inline]
    pub fn record(&self, event: CycleEvent) {
        if self.queue.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Nanoseconds since the recorder was created.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.run_start.elapsed().as_nanos() as u64
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Takes everything recorded so far, oldest first.
    pub fn drain(&self) -> Vec<CycleEvent> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.queue.pop() {
            events.push(event);
        }
        events
    }
}
