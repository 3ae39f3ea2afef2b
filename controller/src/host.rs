use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Local, TimeDelta};
use clap::Parser;
use tracing::{error, info, warn};

use heater_common::{parse_document, ConfigError, HeaterConfig, CONFIG_EXTENSIONS};

use crate::{
    control::{ControlSettings, Controller, RunOutcome, EVENTS},
    ifttt::IftttWebhook,
    inhibit::SystemInhibitor,
    nest::NestClient,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Switches a heater through IFTTT based on a Nest temperature sensor."
)]
struct Cli {
    /// Base configuration file. Without an extension `<PATH>.json` and
    /// `<PATH>.json5` are tried.
    #[arg(
        long,
        short = 'c',
        value_name = "PATH",
        env = "HEATER_CONFIG",
        default_value = "config"
    )]
    config: PathBuf,

    /// Override a configuration value, e.g. `--set temp.on=64`. Repeatable.
    #[arg(long = "set", short = 's', value_name = "KEY.PATH=VALUE")]
    overrides: Vec<String>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config, &cli.overrides)
        .await
        .inspect_err(|err| {
            error!(target: EVENTS, "failed to load configuration: {}", err.report())
        })
        .context("failed to load configuration")?;

    let http = reqwest::Client::builder()
        .timeout(config.time.request_timeout())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build http client")?;

    let sensors = NestClient::new(http.clone(), &config.nest);
    let heater = IftttWebhook::new(http, &config.ifttt);
    let inhibitor = config.stay_awake.then(SystemInhibitor::new);

    if let Some(deadline) = TimeDelta::from_std(config.time.max_execution())
        .ok()
        .and_then(|window| Local::now().checked_add_signed(window))
    {
        info!(
            target: EVENTS,
            on = config.temp.on,
            off = config.temp.off,
            "controlling sensor {} until {}",
            config.nest.sensor_serial_no,
            deadline.format("%H:%M:%S")
        );
    }

    let mut controller = Controller::new(
        ControlSettings::from_config(&config),
        sensors,
        heater,
        inhibitor,
    );

    let outcome = controller.run(shutdown_signal()).await;
    let state = controller.state().as_str();

    match outcome {
        RunOutcome::Completed => {
            info!(target: EVENTS, state, "stopped after max execution time");
            Ok(())
        }
        RunOutcome::Interrupted(signal) => {
            info!(target: EVENTS, state, signal, "stopped by signal");
            Ok(())
        }
        RunOutcome::Failed(err) => {
            Err(anyhow::Error::new(err).context("heater control stopped on a fatal error"))
        }
    }
}

async fn load_config(base: &Path, overrides: &[String]) -> Result<HeaterConfig, ConfigError> {
    let path = resolve_config_path(base)?;
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let document = parse_document(extension, &text)?;
    HeaterConfig::from_sources(document, overrides)
}

fn resolve_config_path(base: &Path) -> Result<PathBuf, ConfigError> {
    match base.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if CONFIG_EXTENSIONS.contains(&ext) => Ok(base.to_path_buf()),
        Some(ext) => Err(ConfigError::UnsupportedExtension(ext.to_string())),
        None => CONFIG_EXTENSIONS
            .iter()
            .map(|ext| base.with_extension(ext))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| ConfigError::NotFound {
                base: base.to_path_buf(),
                extensions: CONFIG_EXTENSIONS.to_vec(),
            }),
    }
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for SIGINT: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
