use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::thermostat::Thresholds;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_MAX_EXECUTION_MS: u64 = 3 * 60 * 60 * 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Base file extensions, in probe order.
pub const CONFIG_EXTENSIONS: [&str; 4] = ["json", "JSON", "json5", "JSON5"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not find {}.{{{}}}", .base.display(), .extensions.join(", "))]
    NotFound {
        base: PathBuf,
        extensions: Vec<&'static str>,
    },
    #[error("unrecognized config file extension {0:?}")]
    UnsupportedExtension(String),
    #[error("malformed configuration")]
    Parse(#[from] serde_json::Error),
    #[error("malformed configuration")]
    ParseJson5(#[from] json5::Error),
    #[error("invalid override {0:?}, expected KEY.PATH=VALUE")]
    InvalidOverride(String),
    #[error("invalid configuration:\n  {}", .0.join("\n  "))]
    Invalid(Vec<String>),
}

impl ConfigError {
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

/// Parses a base file according to its extension. JSON5 files may carry
/// comments, trailing commas and unquoted keys.
pub fn parse_document(extension: &str, text: &str) -> Result<Value, ConfigError> {
    match extension {
        "json" | "JSON" => Ok(serde_json::from_str(text)?),
        "json5" | "JSON5" => Ok(json5::from_str(text)?),
        other => Err(ConfigError::UnsupportedExtension(other.to_string())),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct HeaterConfig {
    pub ifttt: IftttConfig,
    pub nest: NestConfig,
    pub temp: TempConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default, deserialize_with = "coerce::boolean")]
    pub stay_awake: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct IftttConfig {
    #[serde(deserialize_with = "coerce::string")]
    pub on_event: String,
    #[serde(deserialize_with = "coerce::string")]
    pub off_event: String,
    #[serde(deserialize_with = "coerce::string")]
    pub webhook_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct NestConfig {
    #[serde(deserialize_with = "coerce::string")]
    pub email: String,
    #[serde(deserialize_with = "coerce::string")]
    pub password: String,
    #[serde(deserialize_with = "coerce::string")]
    pub sensor_serial_no: String,
}

/// Fahrenheit thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TempConfig {
    #[serde(deserialize_with = "coerce::float")]
    pub on: f64,
    #[serde(deserialize_with = "coerce::float")]
    pub off: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeConfig {
    #[serde(
        rename = "POLL_INTERVAL",
        default = "default_poll_interval",
        deserialize_with = "coerce::unsigned"
    )]
    pub poll_interval_ms: u64,
    #[serde(
        rename = "MAX_EXECUTION",
        default = "default_max_execution",
        deserialize_with = "coerce::unsigned"
    )]
    pub max_execution_ms: u64,
    #[serde(
        rename = "REQUEST_TIMEOUT",
        default = "default_request_timeout",
        deserialize_with = "coerce::unsigned"
    )]
    pub request_timeout_ms: u64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_execution_ms: DEFAULT_MAX_EXECUTION_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl TimeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_execution(&self) -> Duration {
        Duration::from_millis(self.max_execution_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_execution() -> u64 {
    DEFAULT_MAX_EXECUTION_MS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl HeaterConfig {
    /// Builds a validated config from a parsed base document and raw
    /// `KEY.PATH=VALUE` overrides. Later overrides win.
    pub fn from_sources(base: Value, overrides: &[String]) -> Result<Self, ConfigError> {
        if !base.is_object() {
            return Err(ConfigError::Invalid(vec![
                "configuration root must be an object".to_string(),
            ]));
        }

        let mut merged = normalize_keys(base);
        for raw in overrides {
            merge(&mut merged, normalize_keys(parse_override(raw)?));
        }

        let config: HeaterConfig = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            on_f: self.temp.on,
            off_f: self.temp.off,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let required = [
            ("IFTTT.ON_EVENT", &self.ifttt.on_event),
            ("IFTTT.OFF_EVENT", &self.ifttt.off_event),
            ("IFTTT.WEBHOOK_KEY", &self.ifttt.webhook_key),
            ("NEST.EMAIL", &self.nest.email),
            ("NEST.PASSWORD", &self.nest.password),
            ("NEST.SENSOR_SERIAL_NO", &self.nest.sensor_serial_no),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                problems.push(format!("{key} must not be empty"));
            }
        }

        if !self.temp.on.is_finite() || !self.temp.off.is_finite() {
            problems.push("TEMP.ON and TEMP.OFF must be finite numbers".to_string());
        } else if self.temp.on >= self.temp.off {
            problems.push(format!(
                "TEMP.ON ({}) must be lower than TEMP.OFF ({})",
                self.temp.on, self.temp.off
            ));
        }

        let durations = [
            ("TIME.POLL_INTERVAL", self.time.poll_interval_ms),
            ("TIME.MAX_EXECUTION", self.time.max_execution_ms),
            ("TIME.REQUEST_TIMEOUT", self.time.request_timeout_ms),
        ];
        for (key, value) in durations {
            if value == 0 {
                problems.push(format!("{key} must be greater than zero"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

/// Converts `camelCase`, `kebab-case`, `snake_case` and spaced keys to
/// `SCREAMING_SNAKE_CASE`.
pub fn normalize_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (index, &ch) in chars.iter().enumerate() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if !current.is_empty() && ch.is_uppercase() {
            let prev = chars[index - 1];
            let next_is_lower = chars.get(index + 1).is_some_and(|next| next.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| word.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (normalize_key(&key), normalize_keys(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// Deep merge where `overlay` wins. Objects merge key by key, anything else
/// is replaced.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

/// Parses `KEY.PATH=VALUE` into a nested object. A bare `KEY.PATH` sets
/// `true`, like a command-line switch.
pub fn parse_override(raw: &str) -> Result<Value, ConfigError> {
    let (path, value) = match raw.split_once('=') {
        Some((path, value)) => (path, Value::String(value.to_string())),
        None => (raw, Value::Bool(true)),
    };

    let segments: Vec<&str> = path.trim().split('.').collect();
    if segments.iter().any(|segment| segment.trim().is_empty()) {
        return Err(ConfigError::InvalidOverride(raw.to_string()));
    }

    Ok(segments.into_iter().rev().fold(value, |inner, segment| {
        let mut map = Map::new();
        map.insert(segment.trim().to_string(), inner);
        Value::Object(map)
    }))
}

/// Lenient deserializers so string overrides and numeric file values land in
/// the typed fields.
mod coerce {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(value) => Ok(value),
            Value::Number(value) => Ok(value.to_string()),
            Value::Bool(value) => Ok(value.to_string()),
            other => Err(D::Error::custom(format!("expected a string, found {other}"))),
        }
    }

    pub fn float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(value) => value
                .as_f64()
                .ok_or_else(|| D::Error::custom(format!("{value} is not a valid number"))),
            Value::String(value) => value
                .trim()
                .parse::<f64>()
                .map_err(|_| D::Error::custom(format!("{value:?} is not a valid number"))),
            other => Err(D::Error::custom(format!("expected a number, found {other}"))),
        }
    }

    pub fn unsigned<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(value) => value
                .as_u64()
                .or_else(|| {
                    value
                        .as_f64()
                        .filter(|float| *float >= 0.0 && float.fract() == 0.0)
                        .map(|float| float as u64)
                })
                .ok_or_else(|| {
                    D::Error::custom(format!("{value} is not a non-negative integer"))
                }),
            Value::String(value) => value.trim().parse::<u64>().map_err(|_| {
                D::Error::custom(format!("{value:?} is not a non-negative integer"))
            }),
            other => Err(D::Error::custom(format!("expected an integer, found {other}"))),
        }
    }

    pub fn boolean<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Bool(value) => Ok(value),
            Value::Null => Ok(false),
            Value::Number(value) => match value.as_u64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(D::Error::custom(format!("{value} is not a boolean"))),
            },
            Value::String(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" | "" => Ok(false),
                _ => Err(D::Error::custom(format!("{value:?} is not a boolean"))),
            },
            other => Err(D::Error::custom(format!("expected a boolean, found {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "ifttt": {
                "onEvent": "heater_on",
                "offEvent": "heater_off",
                "webhookKey": "abc123"
            },
            "nest": {
                "email": "someone@example.com",
                "password": "hunter2",
                "sensorSerialNo": "18B43000418C6A2A"
            },
            "temp": { "on": 65, "off": 75 },
            "time": { "pollInterval": 30000, "maxExecution": 7200000 }
        })
    }

    #[test]
    fn normalizes_key_styles() {
        let cases = [
            ("sensorSerialNo", "SENSOR_SERIAL_NO"),
            ("SENSOR_SERIAL_NO", "SENSOR_SERIAL_NO"),
            ("webhook-key", "WEBHOOK_KEY"),
            ("IFTTT", "IFTTT"),
            ("ifttt", "IFTTT"),
            ("maxExecution", "MAX_EXECUTION"),
            ("stay awake", "STAY_AWAKE"),
            ("HTTPTimeout", "HTTP_TIMEOUT"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_key(input), expected, "key {input}");
        }
    }

    #[test]
    fn loads_camel_case_document() {
        let config = HeaterConfig::from_sources(base(), &[]).unwrap();

        assert_eq!(config.ifttt.on_event, "heater_on");
        assert_eq!(config.nest.sensor_serial_no, "18B43000418C6A2A");
        assert_eq!(config.thresholds(), Thresholds { on_f: 65.0, off_f: 75.0 });
        assert_eq!(config.time.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.time.max_execution(), Duration::from_secs(7_200));
        assert_eq!(config.time.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert!(!config.stay_awake);
    }

    #[test]
    fn overrides_win_and_are_coerced() {
        let overrides = vec![
            "temp.on=62.5".to_string(),
            "TIME.POLL_INTERVAL=5000".to_string(),
            "stay-awake".to_string(),
            "ifttt.webhook_key=999".to_string(),
        ];
        let config = HeaterConfig::from_sources(base(), &overrides).unwrap();

        assert_eq!(config.temp.on, 62.5);
        assert_eq!(config.temp.off, 75.0);
        assert_eq!(config.time.poll_interval_ms, 5_000);
        assert_eq!(config.time.max_execution_ms, 7_200_000);
        assert!(config.stay_awake);
        assert_eq!(config.ifttt.webhook_key, "999");
    }

    #[test]
    fn numeric_serial_in_file_becomes_string() {
        let mut doc = base();
        doc["nest"]["sensorSerialNo"] = json!(12345);
        let config = HeaterConfig::from_sources(doc, &[]).unwrap();
        assert_eq!(config.nest.sensor_serial_no, "12345");
    }

    #[test]
    fn time_section_is_optional() {
        let mut doc = base();
        doc.as_object_mut().unwrap().remove("time");
        let config = HeaterConfig::from_sources(doc, &[]).unwrap();

        assert_eq!(config.time.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.time.max_execution_ms, DEFAULT_MAX_EXECUTION_MS);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut doc = base();
        doc["extra"] = json!({ "anything": true });
        assert!(HeaterConfig::from_sources(doc, &[]).is_ok());
    }

    #[test]
    fn reports_every_validation_problem() {
        let overrides = vec![
            "temp.on=80".to_string(),
            "time.pollInterval=0".to_string(),
            "nest.email=".to_string(),
        ];
        let err = HeaterConfig::from_sources(base(), &overrides).unwrap_err();

        let problems = match err {
            ConfigError::Invalid(problems) => problems,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert_eq!(
            problems,
            vec![
                "NEST.EMAIL must not be empty".to_string(),
                "TEMP.ON (80) must be lower than TEMP.OFF (75)".to_string(),
                "TIME.POLL_INTERVAL must be greater than zero".to_string(),
            ]
        );
    }

    #[test]
    fn missing_section_is_a_parse_error() {
        let mut doc = base();
        doc.as_object_mut().unwrap().remove("nest");
        let err = HeaterConfig::from_sources(doc, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn parse_error_report_carries_serde_cause() {
        let mut doc = base();
        doc.as_object_mut().unwrap().remove("nest");
        let err = HeaterConfig::from_sources(doc, &[]).unwrap_err();

        let report = err.report();
        assert!(report.starts_with("malformed configuration: "), "{report}");
        assert!(report.contains("missing field `NEST`"), "{report}");
    }

    #[test]
    fn json5_document_allows_comments_and_trailing_commas() {
        let text = r#"{
            // credentials
            ifttt: { onEvent: "heater_on", offEvent: "heater_off", webhookKey: "k3y", },
            nest: { email: "someone@example.com", password: "hunter2", sensorSerialNo: "AAA" },
            /* fahrenheit */
            temp: { on: 64, off: 72, },
        }"#;
        let config = HeaterConfig::from_sources(parse_document("json5", text).unwrap(), &[]).unwrap();

        assert_eq!(config.temp.on, 64.0);
        assert_eq!(config.temp.off, 72.0);
        assert_eq!(config.ifttt.webhook_key, "k3y");
    }

    #[test]
    fn strict_json_rejects_json5_syntax() {
        let err = parse_document("json", "{ on: 64, }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = parse_document("JSON5", "{ on: ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson5(_)));
    }

    #[test]
    fn parse_document_rejects_unknown_extension() {
        let err = parse_document("toml", "").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedExtension(ext) if ext == "toml"));
    }

    #[test]
    fn bad_number_override_is_a_parse_error() {
        let overrides = vec!["temp.off=warm".to_string()];
        let err = HeaterConfig::from_sources(base(), &overrides).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_malformed_override_paths() {
        for raw in ["=5", "temp..on=5", ".on=1"] {
            assert!(
                matches!(parse_override(raw), Err(ConfigError::InvalidOverride(_))),
                "override {raw}"
            );
        }
    }

    #[test]
    fn non_object_root_is_rejected() {
        let err = HeaterConfig::from_sources(json!([1, 2, 3]), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn merge_replaces_scalars_and_keeps_siblings() {
        let mut target = json!({ "A": { "B": 1, "C": 2 }, "D": "x" });
        merge(&mut target, json!({ "A": { "B": 5 }, "D": { "E": true } }));
        assert_eq!(target, json!({ "A": { "B": 5, "C": 2 }, "D": { "E": true } }));
    }
}
