//! Process configuration, read once from the environment at startup.

use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub connection_string: String,
    pub credentials: Credentials,
    pub bucket: String,
    pub scope: String,
    pub ready_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub phone: String,
    pub app_id: i32,
    pub app_hash: String,
    pub group_ids: Vec<i64>,
    /// two-step verification password, only needed when the account has one
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub telegram: TelegramConfig,
}

impl AppConfig {
    /// Load from the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup; empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &'static str| lookup(name).filter(|value| !value.trim().is_empty());

        let ready_timeout = match optional("DOCSTORE_READY_TIMEOUT_SECS") {
            Some(raw) => parse_ready_timeout(&raw).map_err(|reason| ConfigError::Invalid {
                name: "DOCSTORE_READY_TIMEOUT_SECS",
                reason,
            })?,
            None => DEFAULT_READY_TIMEOUT,
        };

        let storage = StorageConfig {
            connection_string: required("DOCSTORE_CONNECTION_STRING")?,
            credentials: Credentials::new(
                required("DOCSTORE_USERNAME")?,
                required("DOCSTORE_PASSWORD")?,
            ),
            bucket: required("DOCSTORE_BUCKET_NAME")?,
            scope: required("DOCSTORE_SCOPE_NAME")?,
            ready_timeout,
        };

        let phone = required("TG_PHONE")?;
        let app_id = required("APP_ID")?
            .trim()
            .parse::<i32>()
            .map_err(|err| ConfigError::Invalid {
                name: "APP_ID",
                reason: format!("{err}"),
            })?;
        let app_hash = required("APP_HASH")?;
        let group_ids = parse_group_ids(&required("GROUP_IDS")?).map_err(|reason| {
            ConfigError::Invalid {
                name: "GROUP_IDS",
                reason,
            }
        })?;

        Ok(AppConfig {
            storage,
            telegram: TelegramConfig {
                phone,
                app_id,
                app_hash,
                group_ids,
                password: optional("TG_PASSWORD"),
            },
        })
    }
}

/// Parse a comma-separated list of signed 64-bit IDs; blanks around items are ignored.
/// Whole seconds, at least one.
pub fn parse_ready_timeout(raw: &str) -> Result<Duration, String> {
    let secs: u64 = raw.trim().parse().map_err(|err| format!("{raw:?}: {err}"))?;
    if secs == 0 {
        return Err("must be at least 1 second".to_string());
    }
    Ok(Duration::from_secs(secs))
}

pub fn parse_group_ids(raw: &str) -> Result<Vec<i64>, String> {
    raw.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<i64>()
                .map_err(|err| format!("{part:?}: {err}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, String> {
        [
            ("DOCSTORE_CONNECTION_STRING", "sqlite::memory:"),
            ("DOCSTORE_USERNAME", "admin"),
            ("DOCSTORE_PASSWORD", "hunter2"),
            ("DOCSTORE_BUCKET_NAME", "telegram"),
            ("DOCSTORE_SCOPE_NAME", "client"),
            ("TG_PHONE", "+15550100"),
            ("APP_ID", "12345"),
            ("APP_HASH", "0123456789abcdef"),
            ("GROUP_IDS", "-1001234567890, 42"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_full_config() {
        let config = load(&full_env()).unwrap();
        assert_eq!(config.storage.connection_string, "sqlite::memory:");
        assert_eq!(config.storage.credentials, Credentials::new("admin", "hunter2"));
        assert_eq!(config.storage.bucket, "telegram");
        assert_eq!(config.storage.scope, "client");
        assert_eq!(config.storage.ready_timeout, DEFAULT_READY_TIMEOUT);
        assert_eq!(config.telegram.app_id, 12345);
        assert_eq!(config.telegram.group_ids, vec![-1001234567890, 42]);
        assert_eq!(config.telegram.password, None);
    }

    #[test]
    fn test_each_required_variable_is_checked() {
        for name in full_env().keys().copied() {
            let mut vars = full_env();
            vars.remove(name);
            assert_eq!(load(&vars), Err(ConfigError::Missing(name)), "{name}");
        }
    }

    #[test]
    fn test_blank_value_is_missing() {
        let mut vars = full_env();
        vars.insert("DOCSTORE_BUCKET_NAME", "  ".into());
        assert_eq!(load(&vars), Err(ConfigError::Missing("DOCSTORE_BUCKET_NAME")));
    }

    #[test]
    fn test_invalid_app_id() {
        let mut vars = full_env();
        vars.insert("APP_ID", "abc".into());
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "APP_ID", .. }));
    }

    #[test]
    fn test_optional_values() {
        let mut vars = full_env();
        vars.insert("DOCSTORE_READY_TIMEOUT_SECS", "3".into());
        vars.insert("TG_PASSWORD", "2fa".into());
        let config = load(&vars).unwrap();
        assert_eq!(config.storage.ready_timeout, Duration::from_secs(3));
        assert_eq!(config.telegram.password.as_deref(), Some("2fa"));

        vars.insert("DOCSTORE_READY_TIMEOUT_SECS", "soon".into());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "DOCSTORE_READY_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn test_zero_ready_timeout_rejected() {
        let mut vars = full_env();
        vars.insert("DOCSTORE_READY_TIMEOUT_SECS", "0".into());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "DOCSTORE_READY_TIMEOUT_SECS", .. })
        ));
        assert_eq!(parse_ready_timeout(" 1 ").unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_group_ids() {
        assert_eq!(parse_group_ids("1").unwrap(), vec![1]);
        assert_eq!(parse_group_ids(" 1 ,-2,3 ").unwrap(), vec![1, -2, 3]);
        assert!(parse_group_ids("1,,2").is_err());
        assert!(parse_group_ids("1,x").unwrap_err().contains("\"x\""));
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let config = load(&full_env()).unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("admin"));
    }
}
