use trail_core::{GestureEvent, GestureKind, GestureState};

/// One scripted gesture transition, fired `at_ms` after start.
#[derive(Clone, Copy, Debug)]
pub struct Cue {
    pub at_ms: u64,
    pub event: GestureEvent,
}

fn cue(at_ms: u64, kind: GestureKind, state: GestureState) -> Cue {
    Cue {
        at_ms,
        event: GestureEvent::new(kind, state, at_ms),
    }
}

fn pan(at_ms: u64, state: GestureState, distance: f32) -> Cue {
    Cue {
        at_ms,
        event: GestureEvent::pan(state, at_ms, distance, REFERENCE_WIDTH),
    }
}

const REFERENCE_WIDTH: f32 = 500.0;

/// A long press, a pan, a cancelled pan and a double tap whose second tap
/// lands while the first cycle is still running.
pub fn demo_script() -> Vec<Cue> {
    use GestureKind::*;
    use GestureState::*;
    vec![
        cue(1_500, LongPress, Began),
        cue(2_300, LongPress, Ended),
        pan(3_000, Began, 0.0),
        pan(3_200, Changed, 0.1),
        pan(3_400, Ended, 0.2),
        pan(4_500, Began, 0.0),
        pan(4_700, Cancelled, -0.3),
        cue(5_200, Tap, Ended),
        cue(5_210, Tap, Ended),
    ]
}
