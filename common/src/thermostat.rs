use crate::types::{HeaterAction, HeaterState};

/// Hysteresis band in Fahrenheit. `on_f` must be below `off_f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub on_f: f64,
    pub off_f: f64,
}

/// Hysteresis rule with a dead band between `on_f` and `off_f`.
///
/// `Unknown` is eligible for an initial turn-off, so a heater found above
/// the band at startup is forced into a known state. Below the band any
/// state other than `On` turns the heater on.
pub fn decide(
    current: HeaterState,
    temp_f: f64,
    on_f: f64,
    off_f: f64,
) -> (HeaterState, Option<HeaterAction>) {
    if temp_f < on_f && current != HeaterState::On {
        (HeaterState::On, Some(HeaterAction::TurnOn))
    } else if temp_f > off_f && matches!(current, HeaterState::On | HeaterState::Unknown) {
        (HeaterState::Off, Some(HeaterAction::TurnOff))
    } else {
        (current, None)
    }
}

/// Owns the heater state for one run.
///
/// Decisions are proposed by [`HeaterEngine::evaluate`] and only take effect
/// once the caller reports the actuation went through via
/// [`HeaterEngine::commit`]. A failed actuation therefore gets re-proposed on
/// the next reading.
#[derive(Debug, Clone)]
pub struct HeaterEngine {
    thresholds: Thresholds,
    state: HeaterState,
}

impl HeaterEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            state: HeaterState::Unknown,
        }
    }

    pub fn state(&self) -> HeaterState {
        self.state
    }

    pub fn evaluate(&self, temp_f: f64) -> Option<HeaterAction> {
        let (_, action) = decide(
            self.state,
            temp_f,
            self.thresholds.on_f,
            self.thresholds.off_f,
        );
        action
    }

    /// Records an accepted actuation. Returns the previous state.
    pub fn commit(&mut self, action: HeaterAction) -> HeaterState {
        std::mem::replace(&mut self.state, action.target())
    }
}
