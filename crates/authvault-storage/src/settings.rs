use std::{fmt, path::PathBuf, time::Duration};

use authvault_core::{StorageError, TenantContext};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL;

pub const ENV_STORAGE_MODE: &str = "AUTHVAULT_STORAGE_MODE";
pub const ENV_USER_ID: &str = "AUTHVAULT_USER_ID";
pub const ENV_CONNECTION_ID: &str = "AUTHVAULT_CONNECTION_ID";
pub const ENV_ENCRYPTION_SECRET: &str = "AUTHVAULT_ENCRYPTION_SECRET";
pub const ENV_DATABASE_URL: &str = "AUTHVAULT_DATABASE_URL";
pub const ENV_CONFIG_DIR: &str = "AUTHVAULT_CONFIG_DIR";
pub const ENV_CACHE_TTL_MS: &str = "AUTHVAULT_CACHE_TTL_MS";

/// Directory under the home dir used by the file fallback when not overridden.
pub const DEFAULT_CONFIG_DIR_NAME: &str = ".mcp-auth";

/// Which backend the process persists auth state in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    Database,
    #[default]
    File,
}

impl StorageMode {
    /// `database` (or `db`) selects the durable backend; anything else the file fallback.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "database" | "db" => StorageMode::Database,
            _ => StorageMode::File,
        }
    }
}

/// Runtime storage settings, read once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub mode: StorageMode,
    pub user_id: Option<String>,
    pub connection_id: Option<String>,
    pub encryption_secret: Option<String>,
    pub database_url: Option<String>,
    pub config_dir: Option<PathBuf>,
    pub cache_ttl: Duration,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            mode: StorageMode::File,
            user_id: None,
            connection_id: None,
            encryption_secret: None,
            database_url: None,
            config_dir: None,
            cache_ttl: DEFAULT_TTL,
        }
    }
}

// Secrets and connection strings stay out of logs.
impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("mode", &self.mode)
            .field("user_id", &self.user_id)
            .field("connection_id", &self.connection_id)
            .field("encryption_secret", &self.encryption_secret.as_ref().map(|_| "<redacted>"))
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("config_dir", &self.config_dir)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl StorageSettings {
    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from a variable lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StorageError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let cache_ttl = match get(ENV_CACHE_TTL_MS) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| StorageError::Configuration(format!("{ENV_CACHE_TTL_MS}: {e}")))?,
            None => DEFAULT_TTL,
        };

        Ok(Self {
            mode: get(ENV_STORAGE_MODE)
                .map(|raw| StorageMode::parse(&raw))
                .unwrap_or_default(),
            user_id: get(ENV_USER_ID),
            connection_id: get(ENV_CONNECTION_ID),
            encryption_secret: get(ENV_ENCRYPTION_SECRET),
            database_url: get(ENV_DATABASE_URL),
            config_dir: get(ENV_CONFIG_DIR).map(PathBuf::from),
            cache_ttl,
        })
    }

    /// Tenant context, present only when both ids are set.
    pub fn tenant(&self) -> Option<TenantContext> {
        match (&self.user_id, &self.connection_id) {
            (Some(user), Some(connection)) => Some(TenantContext::new(user, connection)),
            _ => None,
        }
    }

    /// Whether the durable backend will be used: database mode plus a full tenant context.
    pub fn selects_database(&self) -> bool {
        self.mode == StorageMode::Database && self.tenant().is_some()
    }

    /// Fallback directory: the override, else `~/.mcp-auth`.
    pub fn resolve_config_dir(&self) -> Result<PathBuf, StorageError> {
        if let Some(dir) = &self.config_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir()
            .ok_or_else(|| StorageError::Configuration("no home directory available".into()))?;
        Ok(home.join(DEFAULT_CONFIG_DIR_NAME))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_to_file_mode() {
        let settings = StorageSettings::from_lookup(lookup(&[])).expect("settings");
        assert_eq!(settings, StorageSettings::default());
        assert!(!settings.selects_database());
    }

    #[test]
    fn database_mode_requires_full_tenant() {
        let partial = StorageSettings::from_lookup(lookup(&[
            (ENV_STORAGE_MODE, "database"),
            (ENV_USER_ID, "u1"),
        ]))
        .expect("settings");
        assert_eq!(partial.mode, StorageMode::Database);
        assert!(!partial.selects_database());

        let full = StorageSettings::from_lookup(lookup(&[
            (ENV_STORAGE_MODE, "DB"),
            (ENV_USER_ID, "u1"),
            (ENV_CONNECTION_ID, "c1"),
        ]))
        .expect("settings");
        assert!(full.selects_database());
        assert_eq!(full.tenant(), Some(TenantContext::new("u1", "c1")));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let settings = StorageSettings::from_lookup(lookup(&[
            (ENV_ENCRYPTION_SECRET, "   "),
            (ENV_USER_ID, ""),
        ]))
        .expect("settings");
        assert_eq!(settings.encryption_secret, None);
        assert_eq!(settings.user_id, None);
    }

    #[test]
    fn parses_cache_ttl_and_rejects_garbage() {
        let settings =
            StorageSettings::from_lookup(lookup(&[(ENV_CACHE_TTL_MS, "250")])).expect("settings");
        assert_eq!(settings.cache_ttl, Duration::from_millis(250));

        let err = StorageSettings::from_lookup(lookup(&[(ENV_CACHE_TTL_MS, "soon")]))
            .expect_err("invalid ttl");
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[test]
    fn config_dir_override_wins() {
        let settings = StorageSettings::from_lookup(lookup(&[(ENV_CONFIG_DIR, "/tmp/auth")]))
            .expect("settings");
        assert_eq!(
            settings.resolve_config_dir().expect("dir"),
            PathBuf::from("/tmp/auth")
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let settings = StorageSettings {
            encryption_secret: Some("hunter2".into()),
            database_url: Some("postgres://user:pw@db/auth".into()),
            ..StorageSettings::default()
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("pw@db"));
    }
}
