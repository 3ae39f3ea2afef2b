use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use heater_common::{NestConfig, SensorReading, Session};

use crate::{control::SensorSource, error::ControlError};

pub const NEST_BASE_URL: &str = "https://home.nest.com";

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    access_token: String,
    userid: String,
}

#[derive(Debug, Serialize)]
struct AppLaunchRequest {
    known_bucket_types: &'static [&'static str],
    known_bucket_versions: &'static [&'static str],
}

#[derive(Debug, Deserialize)]
struct AppLaunchResponse {
    #[serde(default)]
    updated_buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
struct Bucket {
    #[serde(default)]
    value: Value,
}

impl Bucket {
    fn reading(&self) -> Option<SensorReading> {
        let serial_number = self.value.get("serial_number")?.as_str()?;
        let temperature_c = self.value.get("current_temperature")?.as_f64()?;
        Some(SensorReading {
            serial_number: serial_number.to_string(),
            temperature_c,
        })
    }
}

impl AppLaunchResponse {
    fn readings(&self) -> Vec<SensorReading> {
        self.updated_buckets
            .iter()
            .filter_map(Bucket::reading)
            .collect()
    }
}

/// Nest cloud client. Temperature sensors show up as `kryptonite` buckets
/// in the app launch payload.
pub struct NestClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
}

impl NestClient {
    pub fn new(http: reqwest::Client, config: &NestConfig) -> Self {
        Self::with_base_url(http, config, NEST_BASE_URL)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        config: &NestConfig,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email: config.email.clone(),
            password: config.password.clone(),
        }
    }

    fn session_url(&self) -> String {
        format!("{}/session", self.base_url)
    }

    fn app_launch_url(&self, user_id: &str) -> String {
        format!("{}/api/0.1/user/{user_id}/app_launch", self.base_url)
    }

    async fn request_session(&self) -> reqwest::Result<SessionResponse> {
        let body = SessionRequest {
            email: &self.email,
            password: &self.password,
        };
        self.http
            .post(self.session_url())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn request_buckets(&self, session: &Session) -> reqwest::Result<AppLaunchResponse> {
        let body = AppLaunchRequest {
            known_bucket_types: &["kryptonite"],
            known_bucket_versions: &[],
        };
        self.http
            .post(self.app_launch_url(&session.user_id))
            .header(AUTHORIZATION, format!("Basic {}", session.token))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl SensorSource for NestClient {
    async fn authenticate(&self) -> Result<Session, ControlError> {
        debug!(url = %self.session_url(), "requesting nest session");
        let response = self
            .request_session()
            .await
            .map_err(|err| ControlError::Auth(err.into()))?;

        Ok(Session {
            token: response.access_token,
            user_id: response.userid,
        })
    }

    async fn fetch_readings(&self, session: &Session) -> Result<Vec<SensorReading>, ControlError> {
        let response = self
            .request_buckets(session)
            .await
            .map_err(|err| ControlError::Transport(err.into()))?;

        let readings = response.readings();
        debug!(
            buckets = response.updated_buckets.len(),
            sensors = readings.len(),
            "fetched nest buckets"
        );
        Ok(readings)
    }
}
