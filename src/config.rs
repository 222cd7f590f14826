//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;

/// Default maximum on-disk size (10 MiB)
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Disk cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory exclusively owned by the cache
    pub directory: PathBuf,
    /// Application version; changing it invalidates everything on disk
    pub app_version: u32,
    /// Maximum total size of committed records in bytes
    pub max_size: u64,
    /// Background maintenance interval in seconds
    pub maintenance_interval: u64,
}

impl CacheConfig {
    /// Creates a config for a directory, version and size, with the default
    /// maintenance interval.
    pub fn new(directory: impl Into<PathBuf>, app_version: u32, max_size: u64) -> Self {
        Self {
            directory: directory.into(),
            app_version,
            max_size,
            ..Self::default()
        }
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DISK_CACHE_DIR` - Cache directory (default: `<tmp>/disk_cache`)
    /// - `DISK_CACHE_APP_VERSION` - Application version (default: 1)
    /// - `DISK_CACHE_MAX_SIZE` - Maximum size in bytes (default: 10 MiB)
    /// - `DISK_CACHE_MAINTENANCE_INTERVAL` - Compaction frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            directory: env::var("DISK_CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.directory),
            app_version: env::var("DISK_CACHE_APP_VERSION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.app_version),
            max_size: env::var("DISK_CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_size),
            maintenance_interval: env::var("DISK_CACHE_MAINTENANCE_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.maintenance_interval),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: env::temp_dir().join("disk_cache"),
            app_version: 1,
            max_size: DEFAULT_MAX_SIZE,
            maintenance_interval: 60,
        }
    }
}
