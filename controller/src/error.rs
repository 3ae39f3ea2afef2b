use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("authentication failed")]
    Auth(#[source] BoxError),
    #[error("failed to fetch sensor readings")]
    Transport(#[source] BoxError),
    #[error("sensor {serial} not found in fetched readings")]
    SensorNotFound { serial: String },
    #[error("failed to trigger heater {action} event")]
    Actuation {
        action: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("failed to inhibit host sleep")]
    Inhibit(#[source] BoxError),
}

impl ControlError {
    /// Message with every source appended, for single-line log records.
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}
