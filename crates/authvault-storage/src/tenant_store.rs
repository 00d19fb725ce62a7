use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use authvault_core::{
    records::{ClientInfoRecord, GenericRecord, RecordStore, RecordStoreError, TokenRecord},
    AuthStorage, ReadOutcome, RecordAddress, StorageError, TenantContext,
};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    cache::{cache_key, ReadCache},
    cipher::TenantCipher,
};

/// Storage adapter bound to one tenant and a durable `RecordStore`.
///
/// Token payloads are encrypted with a key derived from the tenant's user id
/// before they reach the store; client info and generic records are stored as
/// plaintext JSON. Reads go through the shared `ReadCache`.
pub struct TenantStorage {
    tenant: TenantContext,
    records: Arc<dyn RecordStore>,
    cipher: TenantCipher,
    cache: Arc<ReadCache>,
    server_urls: Mutex<HashMap<String, String>>,
}

impl TenantStorage {
    pub fn new(
        tenant: TenantContext,
        records: Arc<dyn RecordStore>,
        cipher: TenantCipher,
        cache: Arc<ReadCache>,
    ) -> Self {
        Self {
            tenant,
            records,
            cipher,
            cache,
            server_urls: Mutex::new(HashMap::new()),
        }
    }

    pub fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    async fn fetch(&self, address: &RecordAddress) -> Result<Option<Value>, StorageError> {
        let raw = match address {
            RecordAddress::Token(key) => match self.records.find_token(key).await? {
                Some(record) => Some(
                    self.cipher
                        .decrypt(&record.encrypted_tokens, &self.tenant.user_id)?,
                ),
                None => None,
            },
            RecordAddress::ClientInfo { server_url_hash } => self
                .records
                .find_client_info(server_url_hash)
                .await?
                .map(|record| record.client_info),
            RecordAddress::Generic(key) => self
                .records
                .find_generic(key)
                .await?
                .map(|record| record.value),
        };

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|e| StorageError::backend(e.to_string()))
        })
        .transpose()
    }

    async fn persist(&self, address: RecordAddress, value: &Value) -> Result<(), StorageError> {
        let json = serde_json::to_string(value).map_err(|e| StorageError::backend(e.to_string()))?;
        let updated_at = Utc::now();

        match address {
            RecordAddress::Token(key) => {
                let encrypted_tokens = self.cipher.encrypt(&json, &self.tenant.user_id)?;
                let server_url = self.server_url_for(&key.server_url_hash);
                let token_type = value
                    .get("token_type")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.records
                    .upsert_token(TokenRecord {
                        key,
                        server_url,
                        encrypted_tokens,
                        token_type,
                        updated_at,
                    })
                    .await?;
            }
            RecordAddress::ClientInfo { server_url_hash } => {
                self.records
                    .upsert_client_info(ClientInfoRecord {
                        server_url_hash,
                        client_info: json,
                        updated_at,
                    })
                    .await?;
            }
            RecordAddress::Generic(key) => {
                self.records
                    .upsert_generic(GenericRecord {
                        key,
                        value: json,
                        updated_at,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    async fn remove(&self, address: &RecordAddress) -> Result<(), RecordStoreError> {
        match address {
            RecordAddress::Token(key) => self.records.delete_token(key).await,
            RecordAddress::ClientInfo { server_url_hash } => {
                self.records.delete_client_info(server_url_hash).await
            }
            RecordAddress::Generic(key) => self.records.delete_generic(key).await,
        }
    }

    fn server_url_for(&self, server_url_hash: &str) -> Option<String> {
        self.server_urls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(server_url_hash)
            .cloned()
    }
}

#[async_trait]
impl AuthStorage for TenantStorage {
    fn backend_name(&self) -> &'static str {
        "database"
    }

    #[instrument(skip_all, fields(server_url_hash = %server_url_hash, filename = %filename))]
    async fn read_outcome(&self, server_url_hash: &str, filename: &str) -> ReadOutcome {
        let key = cache_key(&self.tenant, server_url_hash, filename);
        if let Some(value) = self.cache.get(&key) {
            debug!("cache hit");
            return ReadOutcome::Found(value);
        }
        debug!("cache miss");

        let address = RecordAddress::route(&self.tenant, server_url_hash, filename);
        match self.fetch(&address).await {
            Ok(Some(value)) => {
                self.cache.put(key, value.clone());
                ReadOutcome::Found(value)
            }
            Ok(None) => ReadOutcome::Absent,
            Err(err) => {
                warn!(%address, error = %err, "read failed; reporting absent");
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
        let address = RecordAddress::route(&self.tenant, server_url_hash, filename);
        self.persist(address, value).await?;
        self.cache.put(
            cache_key(&self.tenant, server_url_hash, filename),
            value.clone(),
        );
        Ok(())
    }

    #[instrument(skip_all, fields(server_url_hash = %server_url_hash, filename = %filename))]
    async fn delete(&self, server_url_hash: &str, filename: &str) -> Result<(), StorageError> {
        self.cache
            .invalidate(&cache_key(&self.tenant, server_url_hash, filename));

        let address = RecordAddress::route(&self.tenant, server_url_hash, filename);
        match self.remove(&address).await {
            Ok(()) => Ok(()),
            Err(RecordStoreError::NotFound { .. }) => {
                debug!(%address, "delete of absent record");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn bind_server_url(&self, server_url_hash: &str, server_url: &str) {
        self.server_urls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(server_url_hash.to_string(), server_url.to_string());
    }
}
