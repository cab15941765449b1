//! # Configuration
//!
//! Ambient tunables for a process embedding this crate: where trees are
//! stored by default and how verbosely the crate logs. None of this affects
//! the canonical shape of a sort tree or a Merkle tree — those are fixed by
//! the algorithms in [`crate::sort_tree`] and [`crate::merkle`], not by
//! configuration, since two processes with different settings still need to
//! agree on the same root hash for the same data.
//!
//! ## Example configuration file (config.toml)
//! ```toml
//! log_level = "info"
//! storage_root = "data"
//! ```

use anyhow::Result;
use config::{Config as ConfigLib, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Process-wide settings for a host application built on this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Level passed to `env_logger` (e.g. "error", "warn", "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Default directory prefix a [`crate::format::Storage`] implementation
    /// may use to resolve the relative paths this crate passes to
    /// `save`/`load`. The core itself never touches the filesystem directly.
    #[serde(default = "default_storage_root")]
    pub storage_root: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage_root() -> String {
    "data".to_string()
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        // Format is pinned to TOML explicitly rather than inferred from the
        // file extension, so callers can load from an extensionless path
        // (e.g. a NamedTempFile in tests).
        let settings = ConfigLib::builder().add_source(File::from(path).format(FileFormat::Toml)).build()?;
        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Initializes `env_logger` at the configured level, unless `RUST_LOG`
    /// is already set in the environment (which always wins).
    pub fn init_logging(&self) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(self.log_level.clone())).try_init().ok();
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { log_level: default_log_level(), storage_root: default_storage_root() }
    }
}
