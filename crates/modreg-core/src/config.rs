//! Centralized configuration for the module registry.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};

/// Tunables that shape a registry instance.
///
/// `history_capacity` and `max_min_delay` are fixed when the registry
/// database is first created; later opens read the persisted values back
/// and ignore whatever the caller passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RegistryConfig {
    /// Records retained per key in the history ring buffer.
    pub history_capacity: u32,
    /// Hard ceiling for the governance-configurable timelock, in seconds.
    pub max_min_delay: u64,
    /// Largest accepted batch for bulk operations.
    pub max_batch_size: usize,
    /// Largest page returned by listing operations.
    pub max_page_size: u64,
}

impl RegistryConfig {
    pub const DEFAULT_HISTORY_CAPACITY: u32 = 20;
    pub const MAX_HISTORY_CAPACITY: u32 = 1024;
    /// One week.
    pub const MAX_MIN_DELAY_SECS: u64 = 604_800;
    /// One day.
    pub const DEFAULT_MIN_DELAY_SECS: u64 = 86_400;
    pub const MAX_BATCH_SIZE: usize = 50;
    pub const MAX_PAGE_SIZE: u64 = 200;

    pub const BUSY_TIMEOUT_MS: u64 = 5000;
    pub const DB_FILENAME: &'static str = "registry.db";
    pub const APP_CONFIG_DIR_NAME: &'static str = "modreg";

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 || self.history_capacity > Self::MAX_HISTORY_CAPACITY {
            return Err(RegistryError::Config {
                message: format!(
                    "history_capacity must be between 1 and {}, got {}",
                    Self::MAX_HISTORY_CAPACITY,
                    self.history_capacity
                ),
            });
        }
        if self.max_batch_size == 0 {
            return Err(RegistryError::Config {
                message: "max_batch_size must be at least 1".to_string(),
            });
        }
        if self.max_page_size == 0 {
            return Err(RegistryError::Config {
                message: "max_page_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            history_capacity: Self::DEFAULT_HISTORY_CAPACITY,
            max_min_delay: Self::MAX_MIN_DELAY_SECS,
            max_batch_size: Self::MAX_BATCH_SIZE,
            max_page_size: Self::MAX_PAGE_SIZE,
        }
    }
}

/// Default on-disk location of the registry database.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/modreg/registry.db`
/// - **Windows**: `%APPDATA%\modreg\registry.db`
/// - **macOS**: `~/Library/Application Support/modreg/registry.db`
pub fn default_db_path() -> Result<std::path::PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| RegistryError::Config {
        message: "Could not determine platform config directory".to_string(),
    })?;
    Ok(config_dir
        .join(RegistryConfig::APP_CONFIG_DIR_NAME)
        .join(RegistryConfig::DB_FILENAME))
}
