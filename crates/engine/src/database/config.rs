//! Database configuration via `kvdb.toml`
//!
//! On first open, a default `kvdb.toml` is created in the data directory.
//! To change settings, edit the file and reopen.

use std::path::Path;

use kvdb_core::{KvdbError, KvdbResult, Limits};
use serde::{Deserialize, Serialize};

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "kvdb.toml";

/// Hard ceiling on key length, whatever the config says
pub const KEY_BYTES_CEILING: usize = 1344;

/// Hard ceiling on value length, whatever the config says
pub const VALUE_BYTES_CEILING: usize = 1024 * 1024;

/// Hard ceiling on the number of keyspaces
pub const KVS_COUNT_CEILING: usize = 256;

/// Database configuration loaded from `kvdb.toml`.
///
/// # Example
///
/// ```toml
/// max_kvs_count = 256
/// max_key_bytes = 1344
/// max_value_bytes = 1048576
/// gc_interval_commits = 1024
/// default_transactions_enabled = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvdbConfig {
    /// Maximum number of keyspaces.
    #[serde(default = "default_max_kvs_count")]
    pub max_kvs_count: usize,
    /// Maximum key length in bytes.
    #[serde(default = "default_max_key_bytes")]
    pub max_key_bytes: usize,
    /// Maximum value length in bytes.
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
    /// Run version GC after every N published commits. 0 disables it.
    #[serde(default = "default_gc_interval_commits")]
    pub gc_interval_commits: u64,
    /// `transactions_enabled` for keyspaces created with default params.
    #[serde(default)]
    pub default_transactions_enabled: bool,
}

fn default_max_kvs_count() -> usize {
    KVS_COUNT_CEILING
}

fn default_max_key_bytes() -> usize {
    KEY_BYTES_CEILING
}

fn default_max_value_bytes() -> usize {
    VALUE_BYTES_CEILING
}

fn default_gc_interval_commits() -> u64 {
    1024
}

impl Default for KvdbConfig {
    fn default() -> Self {
        Self {
            max_kvs_count: default_max_kvs_count(),
            max_key_bytes: default_max_key_bytes(),
            max_value_bytes: default_max_value_bytes(),
            gc_interval_commits: default_gc_interval_commits(),
            default_transactions_enabled: false,
        }
    }
}

impl KvdbConfig {
    /// Check every field against its legal range.
    ///
    /// # Errors
    ///
    /// Returns `KvdbError::Config` naming the first offending field.
    pub fn validate(&self) -> KvdbResult<()> {
        check_range("max_kvs_count", self.max_kvs_count, KVS_COUNT_CEILING)?;
        check_range("max_key_bytes", self.max_key_bytes, KEY_BYTES_CEILING)?;
        check_range("max_value_bytes", self.max_value_bytes, VALUE_BYTES_CEILING)?;
        Ok(())
    }

    /// Size limits derived from this config.
    pub fn limits(&self) -> Limits {
        Limits {
            max_key_bytes: self.max_key_bytes,
            max_value_bytes: self.max_value_bytes,
            max_kvs_count: self.max_kvs_count,
            ..Limits::default()
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# kvdb configuration
#
# Maximum number of keyspaces (1..=256)
max_kvs_count = 256

# Maximum key length in bytes (1..=1344)
max_key_bytes = 1344

# Maximum value length in bytes (1..=1048576)
max_value_bytes = 1048576

# Prune old versions after every N commits (0 = only on compact_versions())
gc_interval_commits = 1024

# Keyspaces created with default params require a transaction for writes
default_transactions_enabled = false
"#
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> KvdbResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KvdbConfig = toml::from_str(&content).map_err(|e| {
            KvdbError::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> KvdbResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> KvdbResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| KvdbError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn check_range(field: &str, value: usize, max: usize) -> KvdbResult<()> {
    if value == 0 || value > max {
        return Err(KvdbError::config(format!(
            "{} = {} is out of range (1..={})",
            field, value, max
        )));
    }
    Ok(())
}
