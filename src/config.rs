use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct Settings {
    workspace: Option<PathBuf>,
    remote: RemoteSettings,
    bootstrap_dir: Option<PathBuf>,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let timeout_ms = match get("LESSOND_REMOTE_TIMEOUT_MS") {
            Some(value) => parse_u64("LESSOND_REMOTE_TIMEOUT_MS", value)?,
            None => DEFAULT_REMOTE_TIMEOUT_MS,
        };
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "LESSOND_REMOTE_TIMEOUT_MS",
                value: "0".to_string(),
            });
        }

        let url = get("LESSOND_REMOTE_URL");
        if let Some(ref u) = url {
            if !(u.starts_with("http://") || u.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    field: "LESSOND_REMOTE_URL",
                    value: u.clone(),
                });
            }
        }

        Ok(Settings {
            workspace: get("LESSOND_WORKSPACE").map(PathBuf::from),
            remote: RemoteSettings {
                url,
                timeout: Duration::from_millis(timeout_ms),
            },
            bootstrap_dir: get("LESSOND_BOOTSTRAP_DIR").map(PathBuf::from),
            telemetry: TelemetrySettings {
                log_level: get("LESSOND_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                json: get("LESSOND_LOG_JSON").map(|v| parse_bool(&v)).unwrap_or(false),
            },
        })
    }

    pub fn workspace(&self) -> Option<&PathBuf> {
        self.workspace.as_ref()
    }

    pub fn remote(&self) -> &RemoteSettings {
        &self.remote
    }

    pub fn bootstrap_dir(&self) -> Option<&PathBuf> {
        self.bootstrap_dir.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}
