//! Maps logical resource names onto physical record shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::records::{GenericKey, TokenKey};

pub const TOKENS_FILE: &str = "tokens.json";
pub const CLIENT_INFO_FILE: &str = "client_info.json";

/// The (user, connection) pair every durable operation is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub user_id: String,
    pub connection_id: String,
}

impl TenantContext {
    pub fn new(user_id: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            connection_id: connection_id.into(),
        }
    }
}

impl fmt::Display for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.connection_id)
    }
}

/// Physical record shape a logical filename is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Encrypted, tenant-scoped OAuth tokens.
    Tokens,
    /// Plaintext client registration, shared across tenants per server.
    ClientInfo,
    /// Plaintext tenant-scoped key/value blob.
    Generic,
}

impl ResourceKind {
    pub fn from_filename(filename: &str) -> Self {
        match filename {
            TOKENS_FILE => ResourceKind::Tokens,
            CLIENT_INFO_FILE => ResourceKind::ClientInfo,
            _ => ResourceKind::Generic,
        }
    }

    /// Whether payloads of this shape are encrypted at rest.
    pub fn is_sensitive(self) -> bool {
        matches!(self, ResourceKind::Tokens)
    }
}

/// Composite key addressing one record in the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordAddress {
    Token(TokenKey),
    ClientInfo { server_url_hash: String },
    Generic(GenericKey),
}

impl RecordAddress {
    /// Route a resource address for `tenant` to its physical record key.
    pub fn route(tenant: &TenantContext, server_url_hash: &str, filename: &str) -> Self {
        match ResourceKind::from_filename(filename) {
            ResourceKind::Tokens => RecordAddress::Token(TokenKey {
                user_id: tenant.user_id.clone(),
                connection_id: tenant.connection_id.clone(),
                server_url_hash: server_url_hash.to_string(),
            }),
            ResourceKind::ClientInfo => RecordAddress::ClientInfo {
                server_url_hash: server_url_hash.to_string(),
            },
            ResourceKind::Generic => RecordAddress::Generic(GenericKey {
                user_id: tenant.user_id.clone(),
                connection_id: tenant.connection_id.clone(),
                key: generic_key(server_url_hash, filename),
            }),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            RecordAddress::Token(_) => ResourceKind::Tokens,
            RecordAddress::ClientInfo { .. } => ResourceKind::ClientInfo,
            RecordAddress::Generic(_) => ResourceKind::Generic,
        }
    }
}

impl fmt::Display for RecordAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordAddress::Token(key) => write!(f, "token/{key}"),
            RecordAddress::ClientInfo { server_url_hash } => {
                write!(f, "client_info/{server_url_hash}")
            }
            RecordAddress::Generic(key) => write!(f, "generic/{key}"),
        }
    }
}

/// Key used for generic records: `<serverUrlHash>_<filename>`.
pub fn generic_key(server_url_hash: &str, filename: &str) -> String {
    format!("{server_url_hash}_{filename}")
}
