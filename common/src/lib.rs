pub mod config;
pub mod thermostat;
pub mod types;
pub mod units;

pub use config::{
    parse_document, ConfigError, HeaterConfig, IftttConfig, NestConfig, TempConfig, TimeConfig,
    CONFIG_EXTENSIONS,
};
pub use thermostat::{decide, HeaterEngine, Thresholds};
pub use types::{find_by_serial, HeaterAction, HeaterState, SensorReading, Session};
pub use units::{fahrenheit, format_fahrenheit};
