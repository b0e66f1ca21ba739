//! Gesture streams and the delay accumulators they feed.
//!
//! A host delivers raw state transitions per gesture kind. [`GestureStream`]
//! turns them into completed gestures; [`DelayTracker`] turns completed
//! long presses and pans into a new delay base.

use crate::constants::DELAY_MIN;
use crate::params::Tuning;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GestureKind {
    Tap,
    LongPress,
    Pan,
}

/// Host-reported state of a gesture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureState {
    Began,
    Changed,
    Ended,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GesturePhase {
    #[default]
    Idle,
    Active,
    Ended,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub state: GestureState,
    pub at_ms: u64,
    /// Pan only: normalized displacement at this point of the gesture.
    pub distance: f32,
    /// Pan only: width of the surface the pan happened on.
    pub reference_width: f32,
}

impl GestureEvent {
    pub fn new(kind: GestureKind, state: GestureState, at_ms: u64) -> Self {
        Self {
            kind,
            state,
            at_ms,
            distance: 0.0,
            reference_width: 0.0,
        }
    }

    pub fn pan(state: GestureState, at_ms: u64, distance: f32, reference_width: f32) -> Self {
        Self {
            kind: GestureKind::Pan,
            state,
            at_ms,
            distance,
            reference_width,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompletedGesture {
    Tap,
    LongPress { elapsed_ms: u64 },
    Pan { distance: f32, reference_width: f32 },
}

/// `Idle -> Active -> (Ended | Cancelled)`, back to `Active` on the next start.
#[derive(Clone, Debug)]
pub struct GestureStream {
    kind: GestureKind,
    phase: GesturePhase,
    started_at_ms: u64,
    distance: f32,
}

impl GestureStream {
    pub fn new(kind: GestureKind) -> Self {
        Self {
            kind,
            phase: GesturePhase::Idle,
            started_at_ms: 0,
            distance: 0.0,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn advance(&mut self, ev: &GestureEvent) -> Option<CompletedGesture> {
        debug_assert_eq!(ev.kind, self.kind);
        match (ev.state, self.phase) {
            (GestureState::Began, _) => {
                self.phase = GesturePhase::Active;
                self.started_at_ms = ev.at_ms;
                self.distance = ev.distance;
                None
            }
            (GestureState::Changed, GesturePhase::Active) => {
                self.distance = ev.distance;
                None
            }
            (GestureState::Ended, GesturePhase::Active) => {
                self.phase = GesturePhase::Ended;
                self.distance = ev.distance;
                Some(match self.kind {
                    GestureKind::Tap => CompletedGesture::Tap,
                    GestureKind::LongPress => CompletedGesture::LongPress {
                        elapsed_ms: ev.at_ms.saturating_sub(self.started_at_ms),
                    },
                    GestureKind::Pan => CompletedGesture::Pan {
                        distance: self.distance,
                        reference_width: ev.reference_width,
                    },
                })
            }
            // taps are often reported only once recognized
            (GestureState::Ended, _) if self.kind == GestureKind::Tap => {
                self.phase = GesturePhase::Ended;
                Some(CompletedGesture::Tap)
            }
            (GestureState::Cancelled, GesturePhase::Active) => {
                self.phase = GesturePhase::Cancelled;
                None
            }
            _ => None,
        }
    }
}

/// The delay base both retuning gestures move.
///
/// Long presses add their scaled duration without bound. Pans add a scaled
/// displacement and clamp the result to `[DELAY_MIN, delay_max]`.
#[derive(Clone, Debug)]
pub struct DelayTracker {
    value: f32,
    long_press_scale: f32,
    delay_max: f32,
    pan_sensitivity: f32,
}

impl DelayTracker {
    /// Start from `tuning.delay_base`.
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            value: tuning.delay_base,
            long_press_scale: tuning.long_press_delay_scale,
            delay_max: tuning.delay_max,
            pan_sensitivity: tuning.pan_sensitivity,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn long_press(&mut self, elapsed_ms: u64) -> f32 {
        self.value += elapsed_ms as f32 * self.long_press_scale;
        self.value
    }

    /// `value + delay_max / width * distance * sensitivity`, clamped.
    /// A non-positive width leaves the tracker unchanged.
    pub fn pan(&mut self, distance: f32, reference_width: f32) -> f32 {
        if reference_width <= 0.0 {
            return self.value;
        }
        let rate = self.delay_max / reference_width;
        let next = self.value + rate * distance * self.pan_sensitivity;
        self.value = next.clamp(DELAY_MIN, self.delay_max.max(DELAY_MIN));
        self.value
    }
}
