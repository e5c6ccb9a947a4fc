//! File system paths for the realtime client.

use crate::{RealtimeError, RealtimeResult};
use std::path::PathBuf;

/// Manages file system paths for the realtime client.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.trade-realtime)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.trade-realtime`.
    pub fn new() -> RealtimeResult<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            RealtimeError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self {
            base_dir: home.join(".trade-realtime"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.trade-realtime/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the key-value store path (~/.trade-realtime/storage.json).
    pub fn storage_file(&self) -> PathBuf {
        self.base_dir.join("storage.json")
    }

    /// Get the JSONL log file path (~/.trade-realtime/logs/client.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.base_dir.join("logs").join("client.jsonl")
    }

    /// Ensure the base directory exists.
    pub fn ensure_dirs(&self) -> RealtimeResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}
