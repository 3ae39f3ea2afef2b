use std::{future::Future, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use heater_common::{
    fahrenheit, find_by_serial, format_fahrenheit, HeaterAction, HeaterConfig, HeaterEngine,
    HeaterState, SensorReading, Session, Thresholds,
};

use crate::error::ControlError;

/// Log target for lifecycle events, actuations and state changes.
pub const EVENTS: &str = "heater::event";

#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn authenticate(&self) -> Result<Session, ControlError>;
    async fn fetch_readings(&self, session: &Session) -> Result<Vec<SensorReading>, ControlError>;
}

#[async_trait]
pub trait HeaterSwitch: Send + Sync {
    async fn switch(&self, action: HeaterAction) -> Result<(), ControlError>;
}

#[async_trait]
pub trait SleepInhibitor: Send + Sync {
    type Guard: Send;

    async fn inhibit(&self) -> Result<Self::Guard, ControlError>;
    async fn release(&self, guard: Self::Guard);
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub sensor_serial: String,
    pub thresholds: Thresholds,
    pub poll_interval: Duration,
    pub max_execution: Duration,
}

impl ControlSettings {
    pub fn from_config(config: &HeaterConfig) -> Self {
        Self {
            sensor_serial: config.nest.sensor_serial_no.clone(),
            thresholds: config.thresholds(),
            poll_interval: config.time.poll_interval(),
            max_execution: config.time.max_execution(),
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// `MAX_EXECUTION` elapsed.
    Completed,
    /// Stopped by the named signal.
    Interrupted(&'static str),
    Failed(ControlError),
}

enum LoopExit {
    Completed,
    Interrupted(&'static str),
}

/// Bounded polling loop. Every way out of [`Controller::run`] goes through
/// the same failsafe: one unconditional turn-off, then the sleep inhibitor
/// is released.
pub struct Controller<S, H, I> {
    settings: ControlSettings,
    sensors: S,
    heater: H,
    inhibitor: Option<I>,
    engine: HeaterEngine,
}

impl<S, H, I> Controller<S, H, I>
where
    S: SensorSource,
    H: HeaterSwitch,
    I: SleepInhibitor,
{
    pub fn new(settings: ControlSettings, sensors: S, heater: H, inhibitor: Option<I>) -> Self {
        let engine = HeaterEngine::new(settings.thresholds);
        Self {
            settings,
            sensors,
            heater,
            inhibitor,
            engine,
        }
    }

    pub fn state(&self) -> HeaterState {
        self.engine.state()
    }

    pub async fn run<F>(&mut self, shutdown: F) -> RunOutcome
    where
        F: Future<Output = &'static str>,
    {
        let started_at = Instant::now();
        info!(target: EVENTS, "starting");

        let mut guard = None;
        let exit = {
            let work = self.operate(started_at, &mut guard);
            tokio::pin!(work);
            tokio::pin!(shutdown);

            tokio::select! {
                result = &mut work => result.map(|()| LoopExit::Completed),
                signal = &mut shutdown => Ok(LoopExit::Interrupted(signal)),
            }
        };

        let outcome = match exit {
            Ok(LoopExit::Completed) => {
                info!(target: EVENTS, "automatically turning off");
                RunOutcome::Completed
            }
            Ok(LoopExit::Interrupted(signal)) => {
                warn!(target: EVENTS, signal, "interrupted, turning off");
                RunOutcome::Interrupted(signal)
            }
            Err(err) => {
                error!(target: EVENTS, "{}", err.report());
                RunOutcome::Failed(err)
            }
        };

        self.failsafe_off().await;

        if let (Some(inhibitor), Some(guard)) = (&self.inhibitor, guard.take()) {
            inhibitor.release(guard).await;
            info!(target: EVENTS, "released sleep inhibition");
        }

        outcome
    }

    async fn operate(
        &mut self,
        started_at: Instant,
        guard: &mut Option<I::Guard>,
    ) -> Result<(), ControlError> {
        let session = self.sensors.authenticate().await?;
        debug!(?session, "authenticated");

        if let Some(inhibitor) = &self.inhibitor {
            *guard = Some(inhibitor.inhibit().await?);
            info!(target: EVENTS, "inhibiting host sleep");
        }

        loop {
            self.poll_once(&session).await?;
            tokio::time::sleep(self.settings.poll_interval).await;

            if started_at.elapsed() >= self.settings.max_execution {
                return Ok(());
            }
        }
    }

    async fn poll_once(&mut self, session: &Session) -> Result<(), ControlError> {
        let readings = self.sensors.fetch_readings(session).await?;
        let reading = find_by_serial(&readings, &self.settings.sensor_serial).ok_or_else(|| {
            ControlError::SensorNotFound {
                serial: self.settings.sensor_serial.clone(),
            }
        })?;

        let temp_f = fahrenheit(reading.temperature_c);
        info!("current temperature is {}", format_fahrenheit(temp_f));

        let Some(action) = self.engine.evaluate(temp_f) else {
            return Ok(());
        };

        match self.switch_heater(action).await {
            Ok(()) => {
                let previous = self.engine.commit(action);
                info!(
                    target: EVENTS,
                    from = previous.as_str(),
                    to = action.target().as_str(),
                    "heater state changed"
                );
            }
            // State stays put so the same decision is retried on the next reading.
            Err(err) => warn!(target: EVENTS, "{}", err.report()),
        }
        Ok(())
    }

    async fn switch_heater(&self, action: HeaterAction) -> Result<(), ControlError> {
        self.heater.switch(action).await?;
        info!(target: EVENTS, "turned {} heater", action.as_str());
        Ok(())
    }

    async fn failsafe_off(&mut self) {
        match self.switch_heater(HeaterAction::TurnOff).await {
            Ok(()) => {
                self.engine.commit(HeaterAction::TurnOff);
            }
            Err(err) => error!(
                target: EVENTS,
                "failsafe shutoff failed, heater may still be on: {}",
                err.report()
            ),
        }
    }
}
