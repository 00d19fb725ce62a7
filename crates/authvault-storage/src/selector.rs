//! Chooses, once per process, between the durable adapter and the file fallback.

use std::sync::Arc;

use async_trait::async_trait;
use authvault_core::{
    records::{InMemoryRecordStore, RecordStore},
    AuthStorage, StorageError,
};
use tokio::sync::OnceCell;
use tracing::info;

use crate::{
    cache::ReadCache,
    cipher::TenantCipher,
    file_store::FileStorage,
    settings::{StorageSettings, ENV_DATABASE_URL, ENV_ENCRYPTION_SECRET},
    tenant_store::TenantStorage,
};

/// Opens a record store from a connection address.
#[async_trait]
pub trait RecordStoreConnector: Send + Sync {
    async fn connect(&self, database_url: &str) -> Result<Arc<dyn RecordStore>, StorageError>;
}

/// Connector for `memory://` addresses, backed by `InMemoryRecordStore`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryConnector;

#[async_trait]
impl RecordStoreConnector for MemoryConnector {
    async fn connect(&self, database_url: &str) -> Result<Arc<dyn RecordStore>, StorageError> {
        if database_url.starts_with("memory://") {
            Ok(Arc::new(InMemoryRecordStore::new()))
        } else {
            Err(StorageError::Configuration(format!(
                "unsupported record store address scheme: {}",
                scheme_of(database_url)
            )))
        }
    }
}

/// Owns the process's storage backend.
///
/// The durable adapter is built at most once; later calls return the same
/// instance. When database mode is off or the tenant context is incomplete,
/// every caller gets the file fallback instead.
pub struct BackendSelector {
    settings: StorageSettings,
    connector: Arc<dyn RecordStoreConnector>,
    cache: Arc<ReadCache>,
    fallback: Arc<FileStorage>,
    durable: OnceCell<Option<Arc<TenantStorage>>>,
}

impl BackendSelector {
    pub fn new(
        settings: StorageSettings,
        connector: Arc<dyn RecordStoreConnector>,
    ) -> Result<Self, StorageError> {
        let fallback = Arc::new(FileStorage::new(settings.resolve_config_dir()?));
        let cache = Arc::new(ReadCache::new(settings.cache_ttl));
        Ok(Self {
            settings,
            connector,
            cache,
            fallback,
            durable: OnceCell::new(),
        })
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<ReadCache> {
        &self.cache
    }

    /// File storage, also home of the lockfile and config-directory helpers in either mode.
    pub fn fallback(&self) -> &Arc<FileStorage> {
        &self.fallback
    }

    /// The durable adapter, or `None` when the fallback is selected.
    ///
    /// Fails with `StorageError::Configuration` when database mode is selected
    /// but the encryption secret or database address is missing.
    pub async fn resolve(&self) -> Result<Option<Arc<TenantStorage>>, StorageError> {
        self.durable
            .get_or_try_init(|| self.build_durable())
            .await
            .cloned()
    }

    /// Whichever backend is selected, behind the common storage surface.
    pub async fn storage(&self) -> Result<Arc<dyn AuthStorage>, StorageError> {
        let storage: Arc<dyn AuthStorage> = match self.resolve().await? {
            Some(durable) => durable,
            None => self.fallback.clone(),
        };
        Ok(storage)
    }

    async fn build_durable(&self) -> Result<Option<Arc<TenantStorage>>, StorageError> {
        if !self.settings.selects_database() {
            info!(dir = %self.fallback.config_dir().display(), "using file storage");
            return Ok(None);
        }
        let Some(tenant) = self.settings.tenant() else {
            return Ok(None);
        };

        let secret = self.settings.encryption_secret.clone().ok_or_else(|| {
            StorageError::Configuration(format!(
                "{ENV_ENCRYPTION_SECRET} is required in database mode"
            ))
        })?;
        let database_url = self.settings.database_url.as_deref().ok_or_else(|| {
            StorageError::Configuration(format!("{ENV_DATABASE_URL} is required in database mode"))
        })?;

        let records = self.connector.connect(database_url).await?;
        info!(
            %tenant,
            scheme = scheme_of(database_url),
            backend = records.backend_name(),
            "using database storage"
        );
        Ok(Some(Arc::new(TenantStorage::new(
            tenant,
            records,
            TenantCipher::new(secret),
            self.cache.clone(),
        ))))
    }
}

// Connection strings may carry credentials; only the scheme is ever logged.
fn scheme_of(database_url: &str) -> &str {
    database_url
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .unwrap_or("<none>")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::settings::StorageMode;

    #[derive(Default)]
    struct CountingConnector {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecordStoreConnector for CountingConnector {
        async fn connect(&self, database_url: &str) -> Result<Arc<dyn RecordStore>, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            MemoryConnector.connect(database_url).await
        }
    }

    fn database_settings(dir: &std::path::Path) -> StorageSettings {
        StorageSettings {
            mode: StorageMode::Database,
            user_id: Some("u1".into()),
            connection_id: Some("c1".into()),
            encryption_secret: Some("s3cret".into()),
            database_url: Some("memory://auth".into()),
            config_dir: Some(dir.to_path_buf()),
            ..StorageSettings::default()
        }
    }

    #[tokio::test]
    async fn durable_adapter_is_built_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let connector = Arc::new(CountingConnector::default());
        let selector =
            BackendSelector::new(database_settings(dir.path()), connector.clone()).expect("new");

        let first = selector.resolve().await.expect("resolve").expect("durable");
        let second = selector.resolve().await.expect("resolve").expect("durable");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.tenant().user_id, "u1");
        assert_eq!(
            selector.storage().await.expect("storage").backend_name(),
            "database"
        );
    }

    #[tokio::test]
    async fn incomplete_tenant_falls_back_to_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = StorageSettings {
            connection_id: None,
            ..database_settings(dir.path())
        };
        let selector = BackendSelector::new(settings, Arc::new(MemoryConnector)).expect("new");

        assert!(selector.resolve().await.expect("resolve").is_none());
        assert_eq!(
            selector.storage().await.expect("storage").backend_name(),
            "file"
        );
    }

    #[tokio::test]
    async fn missing_secret_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = StorageSettings {
            encryption_secret: None,
            ..database_settings(dir.path())
        };
        let selector = BackendSelector::new(settings, Arc::new(MemoryConnector)).expect("new");

        let err = selector.resolve().await.err().expect("no secret");
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[tokio::test]
    async fn missing_database_url_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = StorageSettings {
            database_url: None,
            ..database_settings(dir.path())
        };
        let selector = BackendSelector::new(settings, Arc::new(MemoryConnector)).expect("new");

        let err = selector.storage().await.err().expect("no database url");
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[tokio::test]
    async fn memory_connector_rejects_other_schemes() {
        let err = MemoryConnector
            .connect("postgres://user:pw@db/auth")
            .await
            .err()
            .expect("unsupported scheme");
        assert!(matches!(err, StorageError::Configuration(_)));
        assert!(!err.to_string().contains("pw@db"));
    }

    #[tokio::test]
    async fn both_backends_behave_the_same() {
        let durable_dir = tempfile::tempdir().expect("tempdir");
        let file_dir = tempfile::tempdir().expect("tempdir");
        let durable = BackendSelector::new(
            database_settings(durable_dir.path()),
            Arc::new(MemoryConnector),
        )
        .expect("new");
        let fallback = BackendSelector::new(
            StorageSettings {
                mode: StorageMode::File,
                ..database_settings(file_dir.path())
            },
            Arc::new(MemoryConnector),
        )
        .expect("new");

        let tokens = json!({"access_token": "t", "token_type": "bearer"});
        for selector in [&durable, &fallback] {
            let storage = selector.storage().await.expect("storage");
            storage
                .write_json("abc", "tokens.json", &tokens)
                .await
                .expect("write");
            storage
                .write_text("abc", "code_verifier.txt", "v")
                .await
                .expect("write text");

            assert_eq!(
                storage.read_json("abc", "tokens.json").await,
                Some(tokens.clone())
            );
            assert_eq!(
                storage
                    .read_text("abc", "code_verifier.txt", None)
                    .await
                    .expect("read text"),
                "v"
            );
            assert!(storage
                .read_text("abc", "missing.txt", None)
                .await
                .is_err());

            storage.delete("abc", "tokens.json").await.expect("delete");
            storage
                .delete("abc", "tokens.json")
                .await
                .expect("delete again");
            assert_eq!(storage.read_json("abc", "tokens.json").await, None);
        }
    }
}
