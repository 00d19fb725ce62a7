use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use authvault_storage::{settings, StorageMode, StorageSettings};
use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// User-level defaults loaded from `~/.config/authvault/config.toml` (platform-specific).
/// Environment variables take precedence over every value here. The encryption
/// secret is environment-only.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    pub storage_mode: Option<StorageMode>,
    pub user_id: Option<String>,
    pub connection_id: Option<String>,
    pub database_url: Option<String>,
    /// Override for the file fallback directory.
    pub config_dir: Option<PathBuf>,
    pub cache_ttl_ms: Option<u64>,
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("authvault").join("config.toml"))
}

/// Write the given config to disk unless a file already exists there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

/// Merge environment settings over file defaults.
pub fn storage_settings(
    config: &Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<StorageSettings> {
    let mut resolved = StorageSettings::from_lookup(&lookup)?;
    let is_set = |name: &str| lookup(name).is_some_and(|value| !value.trim().is_empty());

    if !is_set(settings::ENV_STORAGE_MODE) {
        resolved.mode = config.storage_mode.unwrap_or_default();
    }
    if !is_set(settings::ENV_CACHE_TTL_MS) {
        if let Some(ms) = config.cache_ttl_ms {
            resolved.cache_ttl = Duration::from_millis(ms);
        }
    }
    resolved.user_id = resolved.user_id.or_else(|| config.user_id.clone());
    resolved.connection_id = resolved
        .connection_id
        .or_else(|| config.connection_id.clone());
    resolved.database_url = resolved
        .database_url
        .or_else(|| config.database_url.clone());
    resolved.config_dir = resolved.config_dir.or_else(|| config.config_dir.clone());
    Ok(resolved)
}
