//! Storage implementations for Authvault.
//! The durable adapter encrypts token payloads with AES-256-GCM under a
//! per-tenant key; the file fallback keeps the same surface on local disk.

pub mod cache;
pub mod cipher;
pub mod file_store;
pub mod selector;
pub mod settings;
pub mod tenant_store;

pub use cache::ReadCache;
pub use cipher::{CipherError, TenantCipher};
pub use file_store::{FileStorage, LockfileData};
pub use selector::{BackendSelector, MemoryConnector, RecordStoreConnector};
pub use settings::{StorageMode, StorageSettings};
pub use tenant_store::TenantStorage;
