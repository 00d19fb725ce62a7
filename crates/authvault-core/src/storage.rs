//! Backend-agnostic storage surface shared by the durable adapter and the file fallback.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::warn;

use crate::error::StorageError;

/// Result of a read that keeps "absent" and "corrupt" apart.
///
/// `AuthStorage::read_json` collapses both into `None`; callers wanting the
/// distinction use `read_outcome` directly.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Found(Value),
    Absent,
    Corrupt { reason: String },
}

impl ReadOutcome {
    pub fn into_option(self) -> Option<Value> {
        match self {
            ReadOutcome::Found(value) => Some(value),
            ReadOutcome::Absent | ReadOutcome::Corrupt { .. } => None,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, ReadOutcome::Corrupt { .. })
    }
}

/// Shape check applied to decoded JSON before it reaches the caller.
pub trait JsonValidator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), String>;
}

/// Validates by deserializing into `T`.
pub struct SchemaValidator<T> {
    _shape: PhantomData<fn() -> T>,
}

impl<T> SchemaValidator<T> {
    pub fn new() -> Self {
        Self {
            _shape: PhantomData,
        }
    }
}

impl<T> Default for SchemaValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> JsonValidator for SchemaValidator<T> {
    fn validate(&self, value: &Value) -> Result<(), String> {
        T::deserialize(value)
            .map(|_| ())
            .map_err(|err| err.to_string())
    }
}

/// Read/write/delete of JSON and text resources addressed by
/// `(server_url_hash, filename)`.
///
/// Reads are fail-soft: any failure is logged and reported as absent.
/// Writes and deletes propagate failures; deleting a missing resource succeeds.
#[async_trait]
pub trait AuthStorage: Send + Sync {
    /// Short name used for logging and health output.
    fn backend_name(&self) -> &'static str;

    async fn read_outcome(&self, server_url_hash: &str, filename: &str) -> ReadOutcome;

    /// Persist `value`, overwriting any existing entry.
    async fn write_json(
        &self,
        server_url_hash: &str,
        filename: &str,
        value: &Value,
    ) -> Result<(), StorageError>;

    /// Remove a resource (idempotent).
    async fn delete(&self, server_url_hash: &str, filename: &str) -> Result<(), StorageError>;

    /// Record the real server URL behind `server_url_hash` for backends that persist it.
    fn bind_server_url(&self, _server_url_hash: &str, _server_url: &str) {}

    async fn read_json(&self, server_url_hash: &str, filename: &str) -> Option<Value> {
        self.read_outcome(server_url_hash, filename)
            .await
            .into_option()
    }

    /// Like `read_json`, but a value rejected by `validator` is reported as absent.
    async fn read_validated(
        &self,
        server_url_hash: &str,
        filename: &str,
        validator: &dyn JsonValidator,
    ) -> Option<Value> {
        let value = self.read_json(server_url_hash, filename).await?;
        match validator.validate(&value) {
            Ok(()) => Some(value),
            Err(reason) => {
                warn!(server_url_hash, filename, %reason, "stored value failed validation");
                None
            }
        }
    }

    /// Read a plain string. Fails with `NotFoundOrType` when the value is
    /// absent or not a string; `error_message` overrides the default message.
    async fn read_text(
        &self,
        server_url_hash: &str,
        filename: &str,
        error_message: Option<&str>,
    ) -> Result<String, StorageError> {
        match self.read_json(server_url_hash, filename).await {
            Some(Value::String(text)) => Ok(text),
            _ => Err(StorageError::NotFoundOrType {
                message: error_message
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("error reading {filename}")),
            }),
        }
    }

    async fn write_text(
        &self,
        server_url_hash: &str,
        filename: &str,
        text: &str,
    ) -> Result<(), StorageError> {
        self.write_json(server_url_hash, filename, &Value::String(text.to_string()))
            .await
    }
}

/// Read and deserialize a resource into `T`; mismatched shapes read as absent.
pub async fn read_typed<T, S>(storage: &S, server_url_hash: &str, filename: &str) -> Option<T>
where
    T: DeserializeOwned,
    S: AuthStorage + ?Sized,
{
    let value = storage
        .read_validated(server_url_hash, filename, &SchemaValidator::<T>::new())
        .await?;
    serde_json::from_value(value).ok()
}
