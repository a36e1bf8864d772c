use crate::domain::models::RecurrenceDefaults;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::logging::normalize_level;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const ENGINE_JSON: &str = "engine.json";
const SUPPORTED_SCHEMA: u64 = 1;
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_COLOR_TAG: &str = "#C0392B";
const API_BASE_URL_KEYS: &[&str] = &["AGENDA_API_BASE_URL", "AGENDA_API_URL"];
const TIMEZONE_KEYS: &[&str] = &["AGENDA_TIMEZONE"];
const LOG_LEVEL_KEYS: &[&str] = &["AGENDA_LOG_LEVEL"];
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub schema: u8,
    pub api_base_url: String,
    pub timezone: String,
    #[serde(default)]
    pub recurrence: RecurrenceDefaults,
    #[serde(default)]
    pub default_color_tag: Option<String>,
    #[serde(default)]
    pub hydrate_retry: RetrySettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA as u8,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            recurrence: RecurrenceDefaults::default(),
            default_color_tag: Some(DEFAULT_COLOR_TAG.to_string()),
            hydrate_retry: RetrySettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.api_base_url.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "apiBaseUrl must not be empty".to_string(),
            ));
        }
        self.time_zone()?;
        self.recurrence
            .validate()
            .map_err(InfraError::InvalidConfig)?;
        normalize_level(&self.log_level)
            .map_err(|error| InfraError::InvalidConfig(format!("logLevel: {error}")))?;
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz, InfraError> {
        self.timezone.trim().parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("unknown timezone '{}': {error}", self.timezone))
        })
    }

    /// Applies environment-style overrides. `lookup` is `std::env::var` in
    /// production and a map lookup in tests.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = first_lookup_value(&lookup, API_BASE_URL_KEYS) {
            self.api_base_url = value;
        }
        if let Some(value) = first_lookup_value(&lookup, TIMEZONE_KEYS) {
            self.timezone = value;
        }
        if let Some(value) = first_lookup_value(&lookup, LOG_LEVEL_KEYS) {
            self.log_level = value;
        }
        self
    }
}

fn first_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|key| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(ENGINE_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&EngineConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_config(config_dir: &Path) -> Result<EngineConfig, InfraError> {
    let path = config_dir.join(ENGINE_JSON);
    let value = read_config(&path)?;
    let config: EngineConfig = serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid {}: {error}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

pub fn load_config_with_env(config_dir: &Path) -> Result<EngineConfig, InfraError> {
    let config = load_config(config_dir)?.with_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_written_once_and_loads() {
        let dir = tempfile::tempdir().expect("tempdir");
        ensure_default_config(dir.path()).expect("write defaults");

        let loaded = load_config(dir.path()).expect("load defaults");
        assert_eq!(loaded, EngineConfig::default());
        assert_eq!(loaded.recurrence.daily, 7);
        assert_eq!(loaded.recurrence.weekly, 4);
        assert_eq!(loaded.recurrence.monthly, 3);

        let mut edited = loaded.clone();
        edited.timezone = "Asia/Taipei".to_string();
        fs::write(
            dir.path().join(ENGINE_JSON),
            serde_json::to_string_pretty(&edited).expect("serialize"),
        )
        .expect("write edited");
        ensure_default_config(dir.path()).expect("keep existing file");
        assert_eq!(
            load_config(dir.path()).expect("load edited").timezone,
            "Asia/Taipei"
        );
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(ENGINE_JSON),
            r#"{"schema": 2, "apiBaseUrl": "http://x/", "timezone": "UTC"}"#,
        )
        .expect("write config");
        assert!(matches!(
            load_config(dir.path()),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(ENGINE_JSON),
            r#"{"schema": 1, "apiBaseUrl": "http://x/", "timezone": "Mars/Olympus"}"#,
        )
        .expect("write config");
        assert!(matches!(
            load_config(dir.path()),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_optional_sections_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(ENGINE_JSON),
            r#"{"schema": 1, "apiBaseUrl": "http://x/", "timezone": "UTC"}"#,
        )
        .expect("write config");
        let loaded = load_config(dir.path()).expect("load");
        assert_eq!(loaded.recurrence, RecurrenceDefaults::default());
        assert_eq!(loaded.hydrate_retry, RetrySettings::default());
        assert_eq!(loaded.default_color_tag, None);
        assert_eq!(loaded.log_level, "info");
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let config = EngineConfig {
            log_level: "verbose".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn non_positive_horizon_is_rejected() {
        let mut config = EngineConfig::default();
        config.recurrence.weekly = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_take_precedence_and_skip_blank_values() {
        let values = HashMap::from([
            ("AGENDA_API_BASE_URL", "   "),
            ("AGENDA_API_URL", " https://api.example.test/v1/ "),
            ("AGENDA_TIMEZONE", "Europe/Paris"),
            ("AGENDA_LOG_LEVEL", "debug"),
        ]);
        let config = EngineConfig::default()
            .with_overrides(|key| values.get(key).map(|value| value.to_string()));

        assert_eq!(config.api_base_url, "https://api.example.test/v1/");
        assert_eq!(config.timezone, "Europe/Paris");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.time_zone().expect("valid tz"), chrono_tz::Europe::Paris);
    }
}
