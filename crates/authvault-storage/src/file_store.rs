use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use authvault_core::{AuthStorage, ReadOutcome, StorageError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

const LOCKFILE_NAME: &str = "lock.json";

/// Coordination data written by a process that owns the auth flow for a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockfileData {
    pub pid: u32,
    pub port: u16,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
}

/// File-backed storage used when the durable backend is not selected.
/// Each resource lives at `<root>/<serverUrlHash>_<filename>` as plaintext JSON.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn config_dir(&self) -> &Path {
        &self.root
    }

    pub fn ensure_config_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(storage_err)
    }

    pub fn config_file_path(&self, server_url_hash: &str, filename: &str) -> PathBuf {
        self.root.join(format!("{server_url_hash}_{filename}"))
    }

    #[instrument(skip_all, fields(server_url_hash = %server_url_hash, port = port))]
    pub fn create_lockfile(
        &self,
        server_url_hash: &str,
        pid: u32,
        port: u16,
    ) -> Result<LockfileData, StorageError> {
        let data = LockfileData {
            pid,
            port,
            timestamp: Utc::now().timestamp_millis(),
        };
        let json = serde_json::to_vec_pretty(&data).map_err(storage_err)?;
        write_atomic(&self.config_file_path(server_url_hash, LOCKFILE_NAME), &json)?;
        Ok(data)
    }

    /// Current lockfile, or `None` when missing or unreadable.
    #[instrument(skip_all, fields(server_url_hash = %server_url_hash))]
    pub fn check_lockfile(&self, server_url_hash: &str) -> Option<LockfileData> {
        let path = self.config_file_path(server_url_hash, LOCKFILE_NAME);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(error = %err, "failed to read lockfile");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(error = %err, "ignoring malformed lockfile");
                None
            }
        }
    }

    #[instrument(skip_all, fields(server_url_hash = %server_url_hash))]
    pub fn delete_lockfile(&self, server_url_hash: &str) -> Result<(), StorageError> {
        remove_if_exists(&self.config_file_path(server_url_hash, LOCKFILE_NAME))
    }
}

#[async_trait]
impl AuthStorage for FileStorage {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    #[instrument(skip_all, fields(server_url_hash = %server_url_hash, filename = %filename))]
    async fn read_outcome(&self, server_url_hash: &str, filename: &str) -> ReadOutcome {
        let path = self.config_file_path(server_url_hash, filename);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return ReadOutcome::Absent,
            Err(err) => {
                warn!(error = %err, "read failed; reporting absent");
                return ReadOutcome::Corrupt {
                    reason: err.to_string(),
                };
            }
        };
        match serde_json::from_str(&contents) {
            Ok(value) => ReadOutcome::Found(value),
            Err(err) => {
                warn!(error = %err, "stored file is not valid JSON; reporting absent");
                ReadOutcome::Corrupt {
                    reason: err.to_string(),
                }
            }
        }
    }

    #[instrument(skip_all, fields(server_url_hash = %server_url_hash, filename = %filename))]
    async fn write_json(
        &self,
        server_url_hash: &str,
        filename: &str,
        value: &Value,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(value).map_err(storage_err)?;
        write_atomic(&self.config_file_path(server_url_hash, filename), &json)
    }

    #[instrument(skip_all, fields(server_url_hash = %server_url_hash, filename = %filename))]
    async fn delete(&self, server_url_hash: &str, filename: &str) -> Result<(), StorageError> {
        remove_if_exists(&self.config_file_path(server_url_hash, filename))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::backend("invalid storage path"))?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(bytes).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600)).map_err(storage_err)?;
    }
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "delete of absent file");
            Ok(())
        }
        Err(err) => Err(storage_err(err)),
    }
}

fn storage_err<E: ToString>(err: E) -> StorageError {
    StorageError::backend(err.to_string())
}
