use std::env;
use std::time::Duration;

use tracing::info;

use crate::error::{Result, RoostError};

/// Every three hours, on the hour (seconds-first cron syntax).
pub const DEFAULT_SCHEDULE: &str = "0 0 */3 * * *";

const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_COLLECT_LIMIT: u32 = 100;
const DEFAULT_PACING_SECS: u64 = 15;
const DEFAULT_AUDIT_ACTOR: &str = "roost";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub db_user: String,
    pub db_host: String,
    pub db_name: String,
    pub db_password: String,
    pub db_port: u16,
    pub db_max_connections: u32,

    // Collection
    pub apify_api_key: Option<String>,
    pub collect_limit: u32,
    pub pacing: Duration,
    pub schedule: String,

    // Audit columns
    pub audit_created_by: String,
    pub audit_modified_by: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| RoostError::Config(format!("{key} environment variable is required")))
        };

        Ok(Self {
            db_user: required("DB_USER")?,
            db_host: required("DB_HOST")?,
            db_name: required("DB_NAME")?,
            db_password: required("DB_PASSWORD")?,
            db_port: parsed(&lookup, "DB_PORT", DEFAULT_DB_PORT)?,
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            apify_api_key: lookup("APIFY_API_KEY").filter(|v| !v.is_empty()),
            collect_limit: parsed(&lookup, "COLLECT_LIMIT", DEFAULT_COLLECT_LIMIT)?,
            pacing: Duration::from_secs(parsed(&lookup, "PACING_SECS", DEFAULT_PACING_SECS)?),
            schedule: lookup("HARVEST_SCHEDULE").unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            audit_created_by: lookup("AUDIT_CREATED_BY")
                .unwrap_or_else(|| DEFAULT_AUDIT_ACTOR.to_string()),
            audit_modified_by: lookup("AUDIT_MODIFIED_BY")
                .unwrap_or_else(|| DEFAULT_AUDIT_ACTOR.to_string()),
        })
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            db_host = self.db_host.as_str(),
            db_port = self.db_port,
            db_name = self.db_name.as_str(),
            db_user = self.db_user.as_str(),
            db_password = redact(&self.db_password),
            db_max_connections = self.db_max_connections,
            apify_api_key = self.apify_api_key.as_deref().map(redact).unwrap_or("<unset>"),
            collect_limit = self.collect_limit,
            pacing_secs = self.pacing.as_secs(),
            schedule = self.schedule.as_str(),
            audit_created_by = self.audit_created_by.as_str(),
            audit_modified_by = self.audit_modified_by.as_str(),
            "Loaded config"
        );
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|_| RoostError::Config(format!("{key} must be a number, got {raw:?}"))),
        None => Ok(default),
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("DB_USER", "roost"),
        ("DB_HOST", "localhost"),
        ("DB_NAME", "roost"),
        ("DB_PASSWORD", "secret"),
    ];

    #[test]
    fn defaults_apply_when_optional_keys_missing() {
        let config = Config::from_lookup(lookup(BASE)).unwrap();

        assert_eq!(config.db_port, 5432);
        assert_eq!(config.collect_limit, 100);
        assert_eq!(config.pacing, Duration::from_secs(15));
        assert_eq!(config.schedule, DEFAULT_SCHEDULE);
        assert_eq!(config.audit_created_by, "roost");
        assert!(config.apify_api_key.is_none());
    }

    #[test]
    fn missing_required_key_is_config_error() {
        let err = Config::from_lookup(lookup(&BASE[..3])).unwrap_err();
        assert!(matches!(err, RoostError::Config(msg) if msg.contains("DB_PASSWORD")));
    }

    #[test]
    fn malformed_port_is_config_error() {
        let mut pairs = BASE.to_vec();
        pairs.push(("DB_PORT", "five"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, RoostError::Config(msg) if msg.contains("DB_PORT")));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("DB_PORT", "6543"),
            ("PACING_SECS", "2"),
            ("AUDIT_MODIFIED_BY", "refresher"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.db_port, 6543);
        assert_eq!(config.pacing, Duration::from_secs(2));
        assert_eq!(config.audit_modified_by, "refresher");
        assert_eq!(config.audit_created_by, "roost");
    }
}
