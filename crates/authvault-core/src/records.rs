//! Record-store contract: the three physical tables auth state is persisted in.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique key of a token record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenKey {
    pub user_id: String,
    pub connection_id: String,
    pub server_url_hash: String,
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.user_id, self.connection_id, self.server_url_hash
        )
    }
}

/// Unique key of a generic record. `key` is `<serverUrlHash>_<filename>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericKey {
    pub user_id: String,
    pub connection_id: String,
    pub key: String,
}

impl fmt::Display for GenericKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.connection_id, self.key)
    }
}

/// Encrypted OAuth tokens for one tenant and server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub key: TokenKey,
    /// Originating server URL. `None` until a caller binds the real URL.
    pub server_url: Option<String>,
    /// `iv:tag:ciphertext` hex triple of the JSON-encoded token payload.
    pub encrypted_tokens: String,
    pub token_type: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Plaintext client registration, shared by every tenant of a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfoRecord {
    pub server_url_hash: String,
    pub client_info: String,
    pub updated_at: DateTime<Utc>,
}

/// Plaintext JSON blob scoped to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericRecord {
    pub key: GenericKey,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Errors produced by record-store implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordStoreError {
    /// No record exists under the key.
    #[error("record not found: {key}")]
    NotFound { key: String },
    /// Underlying store failure.
    #[error("record store failure: {reason}")]
    Backend { reason: String },
}

/// Durable record store: find, upsert (create-or-update) and delete by composite key.
///
/// Deletes of a missing key report `RecordStoreError::NotFound` so callers can
/// tell "already absent" apart from a real failure.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short name used for logging.
    fn backend_name(&self) -> &'static str;

    async fn find_token(&self, key: &TokenKey) -> Result<Option<TokenRecord>, RecordStoreError>;

    /// Create or update a token record. On update a stored `server_url` is
    /// only replaced when the incoming record carries one.
    async fn upsert_token(&self, record: TokenRecord) -> Result<(), RecordStoreError>;

    async fn delete_token(&self, key: &TokenKey) -> Result<(), RecordStoreError>;

    async fn find_client_info(
        &self,
        server_url_hash: &str,
    ) -> Result<Option<ClientInfoRecord>, RecordStoreError>;

    async fn upsert_client_info(&self, record: ClientInfoRecord) -> Result<(), RecordStoreError>;

    async fn delete_client_info(&self, server_url_hash: &str) -> Result<(), RecordStoreError>;

    async fn find_generic(
        &self,
        key: &GenericKey,
    ) -> Result<Option<GenericRecord>, RecordStoreError>;

    async fn upsert_generic(&self, record: GenericRecord) -> Result<(), RecordStoreError>;

    async fn delete_generic(&self, key: &GenericKey) -> Result<(), RecordStoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    tokens: HashMap<TokenKey, TokenRecord>,
    client_info: HashMap<String, ClientInfoRecord>,
    generic: HashMap<GenericKey, GenericRecord>,
}

/// In-memory record store for tests, smoke runs and `memory://` addresses.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    inner: Arc<Mutex<Tables>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RecordStoreError> {
        self.inner.lock().map_err(|err| RecordStoreError::Backend {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

fn not_found(key: impl fmt::Display) -> RecordStoreError {
    RecordStoreError::NotFound {
        key: key.to_string(),
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_token(&self, key: &TokenKey) -> Result<Option<TokenRecord>, RecordStoreError> {
        Ok(self.tables()?.tokens.get(key).cloned())
    }

    async fn upsert_token(&self, mut record: TokenRecord) -> Result<(), RecordStoreError> {
        let mut tables = self.tables()?;
        if record.server_url.is_none() {
            record.server_url = tables
                .tokens
                .get(&record.key)
                .and_then(|existing| existing.server_url.clone());
        }
        tables.tokens.insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete_token(&self, key: &TokenKey) -> Result<(), RecordStoreError> {
        self.tables()?
            .tokens
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| not_found(key))
    }

    async fn find_client_info(
        &self,
        server_url_hash: &str,
    ) -> Result<Option<ClientInfoRecord>, RecordStoreError> {
        Ok(self.tables()?.client_info.get(server_url_hash).cloned())
    }

    async fn upsert_client_info(&self, record: ClientInfoRecord) -> Result<(), RecordStoreError> {
        self.tables()?
            .client_info
            .insert(record.server_url_hash.clone(), record);
        Ok(())
    }

    async fn delete_client_info(&self, server_url_hash: &str) -> Result<(), RecordStoreError> {
        self.tables()?
            .client_info
            .remove(server_url_hash)
            .map(|_| ())
            .ok_or_else(|| not_found(server_url_hash))
    }

    async fn find_generic(
        &self,
        key: &GenericKey,
    ) -> Result<Option<GenericRecord>, RecordStoreError> {
        Ok(self.tables()?.generic.get(key).cloned())
    }

    async fn upsert_generic(&self, record: GenericRecord) -> Result<(), RecordStoreError> {
        self.tables()?.generic.insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete_generic(&self, key: &GenericKey) -> Result<(), RecordStoreError> {
        self.tables()?
            .generic
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| not_found(key))
    }
}
