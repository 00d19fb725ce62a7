use std::sync::Arc;

use authvault_storage::{BackendSelector, MemoryConnector};
use color_eyre::Result;
use tracing::debug;

use crate::config::{self, Config};

/// Build the process-wide backend selector from config plus environment overrides.
pub fn selector_from_config(config: &Config) -> Result<BackendSelector> {
    let settings = config::storage_settings(config, |name| std::env::var(name).ok())?;
    debug!(?settings, "initializing storage");
    Ok(BackendSelector::new(settings, Arc::new(MemoryConnector))?)
}

/// Helper for tests: a file-mode selector rooted at a temp dir.
#[cfg(test)]
pub fn test_selector(root: &std::path::Path) -> BackendSelector {
    let settings = authvault_storage::StorageSettings {
        config_dir: Some(root.to_path_buf()),
        ..Default::default()
    };
    BackendSelector::new(settings, Arc::new(MemoryConnector)).expect("selector")
}
