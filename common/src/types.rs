use std::fmt;

/// Last known heater state as tracked by the controller.
///
/// `Unknown` only exists before the first successful actuation; once the
/// heater has been switched it is always `On` or `Off`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaterState {
    #[default]
    Unknown,
    On,
    Off,
}

impl HeaterState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterAction {
    TurnOn,
    TurnOff,
}

impl HeaterAction {
    /// State the heater is in once this action has been accepted.
    pub fn target(self) -> HeaterState {
        match self {
            Self::TurnOn => HeaterState::On,
            Self::TurnOff => HeaterState::Off,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TurnOn => "on",
            Self::TurnOff => "off",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub serial_number: String,
    pub temperature_c: f64,
}

pub fn find_by_serial<'a>(readings: &'a [SensorReading], serial: &str) -> Option<&'a SensorReading> {
    readings
        .iter()
        .find(|reading| reading.serial_number == serial)
}

/// Authenticated handle for the sensor cloud, valid for one run.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}
