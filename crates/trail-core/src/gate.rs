use std::cell::Cell;

/// Single-flag guard serializing rebuild cycles.
///
/// Not `Sync`: the controller and its handles share one thread.
#[derive(Debug, Default)]
pub struct CycleGate {
    busy: Cell<bool>,
}

impl CycleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the gate busy and returns true iff it was free.
    pub fn try_enter(&self) -> bool {
        !self.busy.replace(true)
    }

    pub fn exit(&self) {
        self.busy.set(false);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Take ownership of a cycle already entered with [`try_enter`](Self::try_enter).
    /// The gate reopens when the guard drops.
    pub fn adopt(&self) -> GateGuard<'_> {
        debug_assert!(self.is_busy());
        GateGuard { gate: self }
    }

    pub fn enter(&self) -> Option<GateGuard<'_>> {
        self.try_enter().then(|| GateGuard { gate: self })
    }
}

#[must_use = "the gate reopens as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    gate: &'a CycleGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.exit();
    }
}
