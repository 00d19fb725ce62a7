//! Core abstractions for Authvault: tenant-scoped resource routing, record-store
//! contracts and the backend-agnostic storage surface.
//! This crate carries no crypto or filesystem code; implementations live in
//! `authvault-storage`.

pub mod error;
pub mod records;
pub mod resource;
pub mod storage;

pub use error::StorageError;
pub use resource::{RecordAddress, ResourceKind, TenantContext};
pub use storage::{AuthStorage, JsonValidator, ReadOutcome, SchemaValidator};
