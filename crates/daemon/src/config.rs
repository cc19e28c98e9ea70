//! Daemon configuration from environment variables.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `TASKMILL_ENV` | `production` | `dev` shortens the revocation refresh interval |
//! | `DATABASE_URL` | unset | Postgres URL; in-memory stores when unset |
//! | `PRO_BACKEND_URL` | `http://localhost:8090` | base URL of the pro backend |
//! | `TASKMILL_TRIGGER_INTERVAL_SECS` | `60` | period of the trigger timer |
//! | `TASKMILL_AVATAR_DIR` | `avatars` | where downloaded avatars are written |
//! | `TASKMILL_PRO_AVAILABLE` | `false` | enables the revocation refresh |
//! | `TASKMILL_LOG_FORMAT` | `json` (`pretty` in dev) | log line format |

use std::path::PathBuf;
use std::time::Duration;

use taskmill_jobs::RevocationTrigger;
use taskmill_observability::{LogConfig, LogFormat};

pub const DEFAULT_PRO_BACKEND_URL: &str = "http://localhost:8090";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Production,
}

impl Environment {
    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub environment: Environment,
    pub database_url: Option<String>,
    pub pro_backend_url: String,
    pub trigger_interval: Duration,
    pub avatar_dir: PathBuf,
    pub pro_available: bool,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the process env in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = match get("TASKMILL_ENV") {
            None => Environment::Production,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "dev" | "development" | "devprod" => Environment::Dev,
                "prod" | "production" => Environment::Production,
                _ => {
                    return Err(ConfigError::invalid(
                        "TASKMILL_ENV",
                        &v,
                        "expected dev or production",
                    ));
                }
            },
        };

        let pro_backend_url = get("PRO_BACKEND_URL").unwrap_or_else(|| DEFAULT_PRO_BACKEND_URL.to_string());
        if !(pro_backend_url.starts_with("http://") || pro_backend_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "PRO_BACKEND_URL",
                &pro_backend_url,
                "expected an http(s) URL",
            ));
        }

        let trigger_interval = match get("TASKMILL_TRIGGER_INTERVAL_SECS") {
            None => Duration::from_secs(60),
            Some(v) => match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::invalid(
                        "TASKMILL_TRIGGER_INTERVAL_SECS",
                        &v,
                        "expected a positive number of seconds",
                    ));
                }
            },
        };

        let pro_available = match get("TASKMILL_PRO_AVAILABLE") {
            None => false,
            Some(v) => parse_bool(&v)
                .ok_or_else(|| ConfigError::invalid("TASKMILL_PRO_AVAILABLE", &v, "expected true or false"))?,
        };

        let log_format = match get("TASKMILL_LOG_FORMAT") {
            None if environment.is_dev() => LogFormat::Pretty,
            None => LogFormat::Json,
            Some(v) => v
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid("TASKMILL_LOG_FORMAT", &v, e.to_string()))?,
        };

        Ok(Self {
            environment,
            database_url: get("DATABASE_URL"),
            pro_backend_url: pro_backend_url.trim_end_matches('/').to_string(),
            trigger_interval,
            avatar_dir: get("TASKMILL_AVATAR_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("avatars")),
            pro_available,
            log_format,
        })
    }

    /// Minimum gap between successful revocation refreshes.
    pub fn revocation_interval(&self) -> Duration {
        RevocationTrigger::interval_for(self.environment.is_dev())
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: self.log_format,
            ..LogConfig::default()
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<DaemonConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_any_variables() {
        let config = config(&[]).unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.database_url, None);
        assert_eq!(config.pro_backend_url, DEFAULT_PRO_BACKEND_URL);
        assert_eq!(config.trigger_interval, Duration::from_secs(60));
        assert_eq!(config.avatar_dir, PathBuf::from("avatars"));
        assert!(!config.pro_available);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.revocation_interval(), Duration::from_secs(15 * 60));
    }

    #[test]
    fn dev_environment_shortens_refresh_interval() {
        let config = config(&[("TASKMILL_ENV", "dev"), ("TASKMILL_PRO_AVAILABLE", "1")]).unwrap();

        assert_eq!(config.revocation_interval(), Duration::from_secs(15));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.pro_available);
    }

    #[test]
    fn explicit_values_are_used() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/taskmill"),
            ("PRO_BACKEND_URL", "https://backend.example/"),
            ("TASKMILL_TRIGGER_INTERVAL_SECS", "5"),
            ("TASKMILL_AVATAR_DIR", "/var/lib/taskmill/avatars"),
            ("TASKMILL_LOG_FORMAT", "pretty"),
        ])
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/taskmill"));
        assert_eq!(config.pro_backend_url, "https://backend.example");
        assert_eq!(config.trigger_interval, Duration::from_secs(5));
        assert_eq!(config.avatar_dir, PathBuf::from("/var/lib/taskmill/avatars"));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config(&[("DATABASE_URL", "  ")]).unwrap();
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn invalid_values_are_reported() {
        for (key, value) in [
            ("TASKMILL_ENV", "staging"),
            ("PRO_BACKEND_URL", "ftp://backend"),
            ("TASKMILL_TRIGGER_INTERVAL_SECS", "0"),
            ("TASKMILL_TRIGGER_INTERVAL_SECS", "soon"),
            ("TASKMILL_PRO_AVAILABLE", "maybe"),
            ("TASKMILL_LOG_FORMAT", "xml"),
        ] {
            let err = config(&[(key, value)]).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { key: k, .. } if *k == key),
                "{key}={value} gave {err:?}"
            );
        }
    }
}
